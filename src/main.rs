#[macro_use]
extern crate log;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{self, AsyncBufReadExt, BufReader};

use lunch_poll::config::Config;
use lunch_poll::console::{self, Command, ParseError, Reply};
use lunch_poll::db::MemoryStore;
use lunch_poll::error::DisplayPolicy;
use lunch_poll::operations::{ConnectionStatus, LiveFeed, PollEngine};
use lunch_poll::storage::FileStorage;
use lunch_poll::tracker::LocalVoteTracker;

type Engine = PollEngine<MemoryStore>;

async fn connect(engine: &Arc<Engine>, error_window: Duration) -> Option<LiveFeed> {
    match engine.connect().await {
        Ok(feed) => Some(feed),
        Err(e) => {
            let policy = e.kind().display_policy(error_window);
            print_reply(Reply::Error {
                message: e.to_string(),
                policy,
            });
            None
        }
    }
}

async fn render_updates(engine: Arc<Engine>) {
    let mut views = engine.views();
    while views.changed().await.is_ok() {
        let view = views.borrow().clone();
        println!("{}\n", console::render_view(&*engine, &view));
    }
}

async fn report_status(engine: Arc<Engine>) {
    let mut status = engine.status_updates();
    while status.changed().await.is_ok() {
        let current = status.borrow().clone();
        if let ConnectionStatus::Disconnected(e) = current {
            eprintln!("⚠ {} Type `connect` to retry.", e);
        }
    }
}

fn print_reply(reply: Reply) {
    match reply {
        Reply::Info(text) => println!("{}", text),
        Reply::Error { message, policy: DisplayPolicy::Persistent } => eprintln!("⚠ {}", message),
        Reply::Error { message, policy: DisplayPolicy::Transient(_) } => eprintln!("{}", message),
        Reply::Error { policy: DisplayPolicy::Silent, .. } => (),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let config = Config::load();
    info!("Starting lunch poll on collection {}", config.collection);

    let storage = FileStorage::new(&config.state_file);
    let tracker = LocalVoteTracker::new(Box::new(storage), &config.vote_key);
    let engine = Arc::new(PollEngine::new(MemoryStore::new(), tracker, &config));

    tokio::spawn(render_updates(Arc::clone(&engine)));
    tokio::spawn(report_status(Arc::clone(&engine)));

    let mut feed = connect(&engine, config.error_display).await;
    println!("{}", console::HELP);

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };

        let command = match console::parse_command(&line) {
            Ok(command) => command,
            Err(ParseError::Empty) => continue,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Reconnect => {
                if feed.as_ref().map_or(false, LiveFeed::is_active) {
                    println!("Already connected.");
                    continue;
                }
                if let Some(old) = feed.take() {
                    old.unsubscribe();
                }
                feed = connect(&engine, config.error_display).await;
            }
            command => {
                if let Some(reply) = console::execute(&*engine, command, config.error_display).await {
                    print_reply(reply);
                }
            }
        }
    }

    if let Some(feed) = feed {
        feed.unsubscribe();
    }
    info!("Bye");
}
