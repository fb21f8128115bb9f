//! Convenience prelude for distributed lock types.

pub use crate::client::LockClient;
pub use crate::error::{LockError, LockResult};
pub use crate::handle::Lock;
pub use crate::retry::{ExponentialBackoffRetry, FixedIntervalRetry, RetryStrategy};
pub use crate::store::{LockStore, Script, ScriptReply};
pub use crate::timeout::{cancel_signal, never_cancelled, Timeout};
