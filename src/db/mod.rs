use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

#[cfg(test)]
use mockall::automock;

use crate::error::StoreError;
use crate::model::PlaceId;

mod memory;

pub use memory::MemoryStore;

/// A record as it travels to and from the store: a loosely typed JSON object.
pub type Record = Map<String, Value>;

/// One push from a subscription: the whole collection (`None` when it holds
/// no records) or the error that ended the feed.
pub type FeedEvent = Result<Option<Value>, StoreError>;

pub fn record_path(collection: &str, id: &str) -> String {
    format!("{}/{}", collection, id)
}

/// The realtime record store the poll is kept in.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Appends `record` under a store-generated id and returns that id.
    async fn create(&self, collection: &str, record: Record) -> Result<PlaceId, StoreError>;

    /// Point read of whatever currently lives at `path`.
    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Merges `fields` into the record at `path`. A `null` field removes it.
    async fn update(&self, path: &str, fields: Record) -> Result<(), StoreError>;

    /// Starts a push feed for `collection`. The current contents are
    /// delivered first, then again after every change.
    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError>;
}

/// Receiving end of a push feed. Dropping it releases the feed.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::UnboundedReceiver<FeedEvent>,
}

impl Subscription {
    pub fn channel() -> (mpsc::UnboundedSender<FeedEvent>, Subscription) {
        let (tx, events) = mpsc::unbounded_channel();
        (tx, Subscription { events })
    }

    /// Next push, or `None` once the store has closed the feed.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.events.close();
    }
}
