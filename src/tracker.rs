use crate::model::{PlaceId, PollSnapshot};
use crate::storage::LocalStorage;

/// Remembers which place this client voted for.
///
/// The vote is written to durable storage when possible and always mirrored
/// in memory, so an unavailable store degrades to a per-process memory
/// instead of failing.
pub struct LocalVoteTracker {
    storage: Box<dyn LocalStorage>,
    key: String,
    fallback: Option<PlaceId>,
}

impl LocalVoteTracker {
    pub fn new(storage: Box<dyn LocalStorage>, key: &str) -> LocalVoteTracker {
        LocalVoteTracker {
            storage,
            key: key.to_owned(),
            fallback: None,
        }
    }

    pub fn get(&self) -> Option<PlaceId> {
        match self.storage.get(&self.key) {
            Ok(vote) => vote.filter(|id| !id.is_empty()),
            Err(e) => {
                warn!("Local storage not available, using in-memory vote: {}", e);
                self.fallback.clone()
            }
        }
    }

    pub fn set(&mut self, vote: Option<PlaceId>) {
        let persisted = match &vote {
            Some(id) => self.storage.set(&self.key, id),
            None => self.storage.remove(&self.key),
        };
        if let Err(e) = persisted {
            warn!("Local storage not available, keeping vote in memory: {}", e);
        }
        self.fallback = vote;
    }

    /// Forgets the tracked vote if its place is not in `snapshot`. Returns
    /// whether anything was cleared.
    pub fn reconcile(&mut self, snapshot: &PollSnapshot) -> bool {
        match self.get() {
            Some(id) if !snapshot.contains(&id) => {
                info!("Clearing local vote for vanished place id={}", id);
                self.set(None);
                true
            }
            _ => false,
        }
    }
}
