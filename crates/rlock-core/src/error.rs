//! Error types for distributed lock operations.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shared, cloneable error source.
///
/// Sources are reference-counted so a single failure can be handed to every
/// caller coalesced onto the same acquisition.
pub type SharedSource = Arc<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during lock operations.
#[derive(Error, Debug, Clone)]
pub enum LockError {
    /// The lock could not be acquired: another owner holds it, or retries
    /// were exhausted.
    #[error("lock {key:?} is held by another owner")]
    Contended { key: String },

    /// The store no longer holds our token for this key (expired, taken
    /// over, or deleted).
    #[error("lock {key:?} is not held by this owner")]
    NotHeld { key: String },

    /// A single store round trip did not finish in time.
    #[error("lock operation timed out after {0:?}")]
    Timeout(Duration),

    /// Lock operation was cancelled.
    #[error("lock operation was cancelled")]
    Cancelled,

    /// Transport to the store failed.
    #[error("connection error: {0}")]
    Connection(#[source] SharedSource),

    /// The store answered with an error or an unexpected reply.
    #[error("backend error: {0}")]
    Backend(#[source] SharedSource),

    /// Caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A renewal daemon is already running for this handle.
    #[error("auto refresh is already running for lock {key:?}")]
    AlreadyRefreshing { key: String },
}

impl LockError {
    /// Wraps a transport failure.
    pub fn connection(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Connection(Arc::new(err))
    }

    /// Wraps a store-side or protocol failure.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }

    /// Builds a backend error from a plain message.
    pub fn backend_msg(msg: impl Into<String>) -> Self {
        Self::backend(std::io::Error::other(msg.into()))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// True for transport and protocol failures (never retried internally).
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Backend(_))
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
