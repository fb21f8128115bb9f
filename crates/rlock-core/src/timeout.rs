//! Timeout and cancellation helpers.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{LockError, LockResult};

/// Represents a timeout for a single store round trip.
///
/// - `Some(duration)` - Give up after this duration
/// - `None` - Wait indefinitely
pub type Timeout = Option<Duration>;

/// Runs `fut`, mapping expiry of `timeout` to [`LockError::Timeout`].
pub async fn with_timeout<T, F>(timeout: Timeout, fut: F) -> LockResult<T>
where
    F: Future<Output = LockResult<T>>,
{
    match timeout {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| LockError::Timeout(limit))?,
    }
}

/// Creates a cancellation signal: send `true` to cancel.
pub fn cancel_signal() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// A cancellation signal that never fires.
pub fn never_cancelled() -> watch::Receiver<bool> {
    let (_sender, receiver) = watch::channel(false);
    receiver
}

/// Resolves once `signal` carries `true`.
///
/// A dropped sender can no longer cancel, so this then never resolves.
pub async fn cancelled(signal: &mut watch::Receiver<bool>) {
    let closed = signal.wait_for(|cancel| *cancel).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
