use std::time::Duration;

use thiserror::Error;

/// Failure reported by a [`RealtimeStore`](crate::db::RealtimeStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Permission denied! Please check the database security rules.")]
    PermissionDenied,

    #[error("Network error. Please check your internet connection.")]
    NetworkError,

    #[error("Database error: {0}")]
    Other(String),
}

/// Failure of the client-local persistence. Always recoverable.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("local storage unavailable: {0}")]
    Unavailable(String),

    #[error("local storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("local storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// How an error should be classified by whoever shows it to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    ConcurrencyRejection,
    NotFound,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPolicy {
    /// Nothing is shown.
    Silent,
    /// Shown, then dismissed after the given window.
    Transient(Duration),
    /// Shown until the user refreshes.
    Persistent,
}

impl ErrorKind {
    pub fn display_policy(self, window: Duration) -> DisplayPolicy {
        match self {
            ErrorKind::ConcurrencyRejection => DisplayPolicy::Silent,
            ErrorKind::Validation | ErrorKind::NotFound => DisplayPolicy::Transient(window),
            ErrorKind::Store => DisplayPolicy::Persistent,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddError {
    #[error("Database not connected. Please refresh the page.")]
    NotConnected,

    #[error("Please enter a lunch place name!")]
    EmptyName,

    #[error("Place name must be at least 2 characters long!")]
    TooShort,

    #[error("Place name must be 50 characters or less!")]
    TooLong,

    #[error("This lunch place already exists!")]
    DuplicateName,

    #[error("A place is already being added")]
    AlreadySubmitting,

    #[error("Failed to add place: {0} Please refresh the page to retry.")]
    Store(#[from] StoreError),
}

impl AddError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AddError::EmptyName | AddError::TooShort | AddError::TooLong | AddError::DuplicateName => {
                ErrorKind::Validation
            }
            AddError::AlreadySubmitting => ErrorKind::ConcurrencyRejection,
            AddError::NotConnected | AddError::Store(_) => ErrorKind::Store,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("Database not connected. Please refresh the page.")]
    NotConnected,

    #[error("This place no longer exists!")]
    PlaceNotFound,

    #[error("A vote for this place is already in progress")]
    AlreadyInProgress,

    #[error("You've already voted for this place!")]
    AlreadyVotedHere,

    #[error("Another vote is still being recorded")]
    VoteChangeInProgress,

    #[error("Failed to record your vote: {0} Please refresh the page to retry.")]
    Store(#[from] StoreError),
}

impl VoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoteError::AlreadyVotedHere => ErrorKind::Validation,
            VoteError::AlreadyInProgress | VoteError::VoteChangeInProgress => ErrorKind::ConcurrencyRejection,
            VoteError::PlaceNotFound => ErrorKind::NotFound,
            VoteError::NotConnected | VoteError::Store(_) => ErrorKind::Store,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Database connection timeout. Please refresh the page.")]
    Timeout,

    #[error("Database connection error: {0}")]
    Store(#[from] StoreError),

    #[error("Database feed closed before the first snapshot arrived.")]
    FeedClosed,
}

impl ConnectError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Store
    }
}
