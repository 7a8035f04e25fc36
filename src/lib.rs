#[macro_use]
extern crate log;

pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod model;
pub mod operations;
pub mod ranking;
pub mod storage;
pub mod tracker;
pub mod util;
