use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::{FeedEvent, RealtimeStore, Record, Subscription};
use crate::error::StoreError;
use crate::model::PlaceId;

const ID_LEN: usize = 20;

/// In-process realtime store.
///
/// Paths are either a collection name (`lunchPlaces`) or a record inside one
/// (`lunchPlaces/<id>`). Every mutation pushes the full collection to its
/// subscribers. Besides the store operations it offers the administrative
/// hooks the poll itself never uses: seeding raw records, deleting records,
/// injecting failures and dropping the connection.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Record>,
    subscribers: HashMap<String, Vec<UnboundedSender<FeedEvent>>>,
    failures: HashMap<String, StoreError>,
    offline: Option<StoreError>,
    writes: usize,
}

fn generate_id() -> PlaceId {
    thread_rng().sample_iter(&Alphanumeric).take(ID_LEN).collect()
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('/') {
        Some((collection, id)) => (collection, Some(id)),
        None => (path, None),
    }
}

impl Inner {
    fn check(&self, path: &str) -> Result<(), StoreError> {
        if let Some(e) = &self.offline {
            return Err(e.clone());
        }
        match self.failures.get(path) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn collection_value(&self, collection: &str) -> Option<Value> {
        self.collections
            .get(collection)
            .filter(|records| !records.is_empty())
            .map(|records| Value::Object(records.clone()))
    }

    fn publish(&mut self, collection: &str) {
        let value = self.collection_value(collection);
        if let Some(subscribers) = self.subscribers.get_mut(collection) {
            subscribers.retain(|tx| tx.send(Ok(value.clone())).is_ok());
        }
    }
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Every operation waits `latency` before touching the data, so callers
    /// observe a suspension point the way they would with a remote store.
    pub fn with_latency(latency: Duration) -> MemoryStore {
        MemoryStore {
            latency: Some(latency),
            ..MemoryStore::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Writes a raw value under `collection/id`, bypassing validation.
    pub fn insert(&self, collection: &str, id: &str, value: Value) {
        let mut inner = self.lock();
        inner
            .collections
            .entry(collection.to_owned())
            .or_default()
            .insert(id.to_owned(), value);
        inner.publish(collection);
    }

    /// Deletes the record at `path`, as an administrator would.
    pub fn remove(&self, path: &str) -> Option<Value> {
        let (collection, id) = split_path(path);
        let mut inner = self.lock();
        let removed = id.and_then(|id| inner.collections.get_mut(collection)?.remove(id));
        if removed.is_some() {
            inner.publish(collection);
        }
        removed
    }

    /// Makes every operation addressed to `path` fail with `error`.
    pub fn fail_path(&self, path: &str, error: StoreError) {
        self.lock().failures.insert(path.to_owned(), error);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Fails all operations and ends every open feed with `error`.
    pub fn disconnect(&self, error: StoreError) {
        let mut inner = self.lock();
        for (_, subscribers) in inner.subscribers.drain() {
            for tx in subscribers {
                let _ = tx.send(Err(error.clone()));
            }
        }
        inner.offline = Some(error);
    }

    pub fn reconnect(&self) {
        self.lock().offline = None;
    }

    /// Number of committed creates and updates.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.lock()
            .subscribers
            .get(collection)
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn create(&self, collection: &str, record: Record) -> Result<PlaceId, StoreError> {
        self.pause().await;
        let mut inner = self.lock();
        inner.check(collection)?;

        let id = generate_id();
        inner
            .collections
            .entry(collection.to_owned())
            .or_default()
            .insert(id.clone(), Value::Object(record));
        inner.writes += 1;
        inner.publish(collection);
        Ok(id)
    }

    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.pause().await;
        let inner = self.lock();
        inner.check(path)?;

        let value = match split_path(path) {
            (collection, None) => inner.collection_value(collection),
            (collection, Some(id)) => inner
                .collections
                .get(collection)
                .and_then(|records| records.get(id))
                .cloned(),
        };
        Ok(value)
    }

    async fn update(&self, path: &str, fields: Record) -> Result<(), StoreError> {
        self.pause().await;
        let mut inner = self.lock();
        inner.check(path)?;

        let (collection, id) = match split_path(path) {
            (collection, Some(id)) => (collection, id),
            (collection, None) => {
                return Err(StoreError::Other(format!("cannot update collection {}", collection)))
            }
        };

        let records = inner.collections.entry(collection.to_owned()).or_default();
        let mut record = match records.remove(id) {
            Some(Value::Object(record)) => record,
            _ => Record::new(),
        };
        for (field, value) in fields {
            if value.is_null() {
                record.remove(&field);
            } else {
                record.insert(field, value);
            }
        }
        if !record.is_empty() {
            records.insert(id.to_owned(), Value::Object(record));
        }
        inner.writes += 1;
        inner.publish(collection);
        Ok(())
    }

    async fn subscribe(&self, collection: &str) -> Result<Subscription, StoreError> {
        self.pause().await;
        let mut inner = self.lock();
        inner.check(collection)?;

        let (tx, subscription) = Subscription::channel();
        let _ = tx.send(Ok(inner.collection_value(collection)));
        inner
            .subscribers
            .entry(collection.to_owned())
            .or_default()
            .push(tx);
        Ok(subscription)
    }
}
