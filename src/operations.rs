use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

#[cfg(test)]
use mockall::automock;

use crate::config::Config;
use crate::db::{record_path, RealtimeStore, Subscription};
use crate::error::{AddError, ConnectError, StoreError, VoteError};
use crate::model::*;
use crate::ranking::{compute_ranked_view, RankedView};
use crate::tracker::LocalVoteTracker;
use crate::util::{self, escape_markup, validate_place_name};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected(ConnectError),
}

/// What the input layer can ask of a poll.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PollOperations: Send + Sync {
    async fn add_place(&self, raw_name: &str) -> Result<PlaceId, AddError>;
    async fn vote(&self, place_id: &str) -> Result<VoteOutcome, VoteError>;
    fn ranked_view(&self) -> RankedView;
    fn button_state(&self, place_id: &str) -> VoteButtonState;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn log_store_error(action: &str, e: StoreError) -> StoreError {
    error!("unexpected store error while {}: {:?}", action, e);
    e
}

/// Clears the add-in-flight flag when dropped.
struct SubmitGuard<'a>(&'a AtomicBool);

impl<'a> SubmitGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<SubmitGuard<'a>> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmitGuard(flag))
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum VoteSlot {
    /// A vote for this place is being recorded.
    Target(PlaceId),
    /// The client's vote is moving away from this choice (`None` before the
    /// first vote). Only one move per choice may be in flight.
    Ballot(Option<PlaceId>),
}

/// Holds a slot in the voting set until dropped.
struct VoteGuard<'a> {
    voting: &'a Mutex<HashSet<VoteSlot>>,
    slot: VoteSlot,
}

impl<'a> VoteGuard<'a> {
    fn claim(voting: &'a Mutex<HashSet<VoteSlot>>, slot: VoteSlot) -> Option<VoteGuard<'a>> {
        if !lock(voting).insert(slot.clone()) {
            return None;
        }
        Some(VoteGuard { voting, slot })
    }
}

impl Drop for VoteGuard<'_> {
    fn drop(&mut self) {
        lock(self.voting).remove(&self.slot);
    }
}

/// Background task feeding snapshots into an engine. Dropping it stops the
/// feed; the engine keeps the last snapshot it saw.
#[must_use = "dropping the feed unsubscribes immediately"]
pub struct LiveFeed {
    task: JoinHandle<()>,
}

impl LiveFeed {
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Client-side state of one poll session.
pub struct PollEngine<S> {
    store: S,
    collection: String,
    connect_timeout: Duration,
    snapshot: Mutex<PollSnapshot>,
    tracker: Mutex<LocalVoteTracker>,
    submitting: AtomicBool,
    voting: Mutex<HashSet<VoteSlot>>,
    initialized: AtomicBool,
    loading: AtomicBool,
    views: watch::Sender<RankedView>,
    status: watch::Sender<ConnectionStatus>,
}

impl<S> PollEngine<S>
where
    S: RealtimeStore + 'static,
{
    pub fn new(store: S, tracker: LocalVoteTracker, config: &Config) -> PollEngine<S> {
        let (views, _) = watch::channel(RankedView::default());
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        PollEngine {
            store,
            collection: config.collection.clone(),
            connect_timeout: config.connect_timeout,
            snapshot: Mutex::new(PollSnapshot::default()),
            tracker: Mutex::new(tracker),
            submitting: AtomicBool::new(false),
            voting: Mutex::new(HashSet::new()),
            initialized: AtomicBool::new(false),
            loading: AtomicBool::new(true),
            views,
            status,
        }
    }

    /// Probes the collection, subscribes to it and waits for the first
    /// snapshot. Later snapshots are applied by the returned feed.
    ///
    /// Can be called again after a failure or after the feed has ended.
    pub async fn connect(self: &Arc<Self>) -> Result<LiveFeed, ConnectError> {
        info!("Connecting to collection {}", self.collection);
        self.loading.store(true, Ordering::Release);
        self.set_status(ConnectionStatus::Connecting);

        let established = match timeout(self.connect_timeout, self.establish()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout),
        };

        match established {
            Ok(subscription) => {
                self.initialized.store(true, Ordering::Release);
                info!("Connected to collection {}", self.collection);
                let task = tokio::spawn(Arc::clone(self).follow(subscription));
                Ok(LiveFeed { task })
            }
            Err(e) => {
                error!("Failed to connect to collection {}: {}", self.collection, e);
                self.loading.store(false, Ordering::Release);
                self.set_status(ConnectionStatus::Disconnected(e.clone()));
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<Subscription, ConnectError> {
        let probe = self.store.read_once(&self.collection).await?;
        debug!("Connection probe succeeded, data present: {}", probe.is_some());

        let mut subscription = self.store.subscribe(&self.collection).await?;
        match subscription.next().await {
            Some(Ok(value)) => {
                self.handle_snapshot(value.as_ref());
                Ok(subscription)
            }
            Some(Err(e)) => Err(e.into()),
            None => Err(ConnectError::FeedClosed),
        }
    }

    async fn follow(self: Arc<Self>, mut subscription: Subscription) {
        while let Some(event) = subscription.next().await {
            match event {
                Ok(value) => {
                    self.handle_snapshot(value.as_ref());
                }
                Err(e) => {
                    error!("Realtime feed for {} failed: {}", self.collection, e);
                    self.set_status(ConnectionStatus::Disconnected(e.into()));
                    return;
                }
            }
        }
        warn!("Realtime feed for {} closed by the store", self.collection);
        self.set_status(ConnectionStatus::Disconnected(ConnectError::FeedClosed));
    }

    /// Replaces the current snapshot with a freshly pushed collection and
    /// publishes the new ranked view.
    pub fn handle_snapshot(&self, value: Option<&Value>) -> RankedView {
        let snapshot = PollSnapshot::from_value(value);
        debug!("Snapshot received with {} places", snapshot.len());

        lock(&self.tracker).reconcile(&snapshot);
        let view = compute_ranked_view(&snapshot);
        *lock(&self.snapshot) = snapshot;

        self.loading.store(false, Ordering::Release);
        self.views.send_replace(view.clone());
        self.set_status(ConnectionStatus::Connected);
        view
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status.clone();
            true
        });
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub async fn apply_add_place(&self, raw_name: &str) -> Result<PlaceId, AddError> {
        if !self.is_initialized() {
            return Err(AddError::NotConnected);
        }

        let name = validate_place_name(raw_name)?;
        let duplicate = lock(&self.snapshot).has_name(name);
        if duplicate {
            return Err(AddError::DuplicateName);
        }

        let _guard = match SubmitGuard::claim(&self.submitting) {
            Some(guard) => guard,
            None => {
                debug!("Ignoring add of {:?}, another add is in flight", name);
                return Err(AddError::AlreadySubmitting);
            }
        };

        let record = Place::new_record(&escape_markup(name), util::now());
        let id = self
            .store
            .create(&self.collection, record)
            .await
            .map_err(|e| log_store_error("adding place", e))?;

        info!("Added place {:?} with id={}", name, id);
        Ok(id)
    }

    /// Casts this client's vote for `place_id`, moving it from the previous
    /// place if there was one.
    ///
    /// The move is two independent writes. If the first commits and the
    /// second fails, the previous place stays one vote short and the local
    /// vote still points at it.
    ///
    /// Votes for different places may run at the same time, but two votes
    /// moving away from the same choice would both withdraw it and leave the
    /// client with two live votes, so the later one is rejected.
    pub async fn apply_vote(&self, place_id: &str) -> Result<VoteOutcome, VoteError> {
        if !self.is_initialized() {
            return Err(VoteError::NotConnected);
        }

        let known = lock(&self.snapshot).contains(place_id);
        if !known {
            return Err(VoteError::PlaceNotFound);
        }

        let _target = match VoteGuard::claim(&self.voting, VoteSlot::Target(place_id.to_owned())) {
            Some(guard) => guard,
            None => {
                debug!("Ignoring vote for id={}, already in progress", place_id);
                return Err(VoteError::AlreadyInProgress);
            }
        };

        let prior = lock(&self.tracker).get();
        if prior.as_deref() == Some(place_id) {
            return Err(VoteError::AlreadyVotedHere);
        }

        let _ballot = match VoteGuard::claim(&self.voting, VoteSlot::Ballot(prior.clone())) {
            Some(guard) => guard,
            None => {
                warn!(
                    "Rejecting vote for id={}, another vote moving from {:?} is in flight",
                    place_id, prior
                );
                return Err(VoteError::VoteChangeInProgress);
            }
        };

        if let Some(prior_id) = &prior {
            self.withdraw_vote(prior_id).await?;
        }

        let path = record_path(&self.collection, place_id);
        let current = self
            .store
            .read_once(&path)
            .await
            .map_err(|e| log_store_error("reading vote target", e))?;
        let place = current
            .as_ref()
            .and_then(|value| Place::from_record(place_id, value))
            .ok_or(VoteError::PlaceNotFound)?;

        self.store
            .update(&path, Place::vote_update(place.vote_count + 1, util::now()))
            .await
            .map_err(|e| log_store_error("recording vote", e))?;

        lock(&self.tracker).set(Some(place_id.to_owned()));

        let kind = if prior.is_some() {
            VoteKind::ChangedVote
        } else {
            VoteKind::FirstVote
        };
        info!("Recorded {:?} for id={} ({} votes)", kind, place_id, place.vote_count + 1);

        Ok(VoteOutcome {
            kind,
            place_id: place_id.to_owned(),
            place_name: place.name,
        })
    }

    async fn withdraw_vote(&self, prior_id: &str) -> Result<(), StoreError> {
        let path = record_path(&self.collection, prior_id);
        let current = self
            .store
            .read_once(&path)
            .await
            .map_err(|e| log_store_error("reading previous vote", e))?;

        let place = match current.as_ref().and_then(|value| Place::from_record(prior_id, value)) {
            Some(place) => place,
            None => {
                warn!("Previously voted place id={} no longer exists", prior_id);
                return Ok(());
            }
        };

        let remaining = place.vote_count.saturating_sub(1);
        self.store
            .update(&path, Place::vote_update(remaining, util::now()))
            .await
            .map_err(|e| log_store_error("removing previous vote", e))?;
        debug!("Removed previous vote from id={} ({} left)", prior_id, remaining);
        Ok(())
    }

    pub fn ranked_view(&self) -> RankedView {
        self.views.borrow().clone()
    }

    /// Receives every ranked view as it is published.
    pub fn views(&self) -> watch::Receiver<RankedView> {
        self.views.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn status_updates(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// True until the first snapshot or connection failure.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> PollSnapshot {
        lock(&self.snapshot).clone()
    }

    pub fn local_vote(&self) -> Option<PlaceId> {
        lock(&self.tracker).get()
    }

    pub fn voted_place_name(&self) -> Option<String> {
        let vote = self.local_vote()?;
        lock(&self.snapshot).get(&vote).map(|p| p.name.clone())
    }

    pub fn has_voted(&self) -> bool {
        self.voted_place_name().is_some()
    }

    pub fn button_state(&self, place_id: &str) -> VoteButtonState {
        let button = match self.local_vote() {
            Some(vote) if vote == place_id => VoteButton::Voted,
            Some(_) => VoteButton::ChangeVote,
            None => VoteButton::Vote,
        };
        VoteButtonState {
            button,
            in_progress: lock(&self.voting).contains(&VoteSlot::Target(place_id.to_owned())),
        }
    }
}

#[async_trait]
impl<S> PollOperations for PollEngine<S>
where
    S: RealtimeStore + 'static,
{
    async fn add_place(&self, raw_name: &str) -> Result<PlaceId, AddError> {
        self.apply_add_place(raw_name).await
    }

    async fn vote(&self, place_id: &str) -> Result<VoteOutcome, VoteError> {
        self.apply_vote(place_id).await
    }

    fn ranked_view(&self) -> RankedView {
        PollEngine::ranked_view(self)
    }

    fn button_state(&self, place_id: &str) -> VoteButtonState {
        PollEngine::button_state(self, place_id)
    }
}
