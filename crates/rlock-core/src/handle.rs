//! Lock handle: renew, release and the background renewal daemon.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, instrument, warn};

use crate::error::{LockError, LockResult};
use crate::primitives;
use crate::store::LockStore;
use crate::timeout::{with_timeout, Timeout};

/// Handle for one successful acquisition of a lock.
///
/// Ownership is never proven by local state: `refresh` and `unlock` both
/// re-check the token against the store. Dropping the handle does not
/// release the lock; the store entry expires after its lease unless
/// [`Lock::unlock`] is called.
///
/// # Example
///
/// ```rust,ignore
/// let lock = Arc::new(client.try_lock("job-7", Duration::from_secs(60), None).await?);
/// let daemon = lock.spawn_auto_refresh(Duration::from_secs(20), Duration::from_secs(1));
///
/// do_work().await;
///
/// lock.unlock(Some(Duration::from_secs(1))).await?;
/// daemon.await??;
/// ```
pub struct Lock<S: LockStore> {
    store: Arc<S>,
    key: String,
    token: String,
    lease: Duration,
    /// One-shot stop signal for the renewal daemon. Sending is idempotent.
    release_sender: watch::Sender<bool>,
    /// Set once the renewal daemon gives up on the lock.
    lost_sender: watch::Sender<bool>,
    lost_receiver: watch::Receiver<bool>,
    released: AtomicBool,
    refreshing: AtomicBool,
}

impl<S: LockStore> Lock<S> {
    pub(crate) fn new(store: Arc<S>, key: String, token: String, lease: Duration) -> Self {
        let (release_sender, _) = watch::channel(false);
        let (lost_sender, lost_receiver) = watch::channel(false);
        Self {
            store,
            key,
            token,
            lease,
            release_sender,
            lost_sender,
            lost_receiver,
            released: AtomicBool::new(false),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The ownership token stored under [`key`](Self::key).
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The lease re-applied by every renewal.
    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Returns a receiver that flips to `true` when the renewal daemon stops
    /// because the lock could not be kept.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let mut lost = lock.lost_token().clone();
    /// tokio::select! {
    ///     _ = lost.wait_for(|lost| *lost) => eprintln!("lock was lost"),
    ///     _ = do_work() => {}
    /// }
    /// ```
    pub fn lost_token(&self) -> &watch::Receiver<bool> {
        &self.lost_receiver
    }

    /// Extends the lease once.
    ///
    /// Returns [`LockError::NotHeld`] if the store no longer holds our token.
    #[instrument(skip(self), fields(lock.key = %self.key))]
    pub async fn refresh(&self, timeout: Timeout) -> LockResult<()> {
        let renewed = with_timeout(
            timeout,
            primitives::renew(self.store.as_ref(), &self.key, &self.token, self.lease),
        )
        .await?;
        if renewed {
            Ok(())
        } else {
            Err(self.not_held())
        }
    }

    /// Releases the lock.
    ///
    /// The release signal fires whatever the outcome, even if this future is
    /// dropped before the store answers, so a running renewal daemon always
    /// stops. The handle must not be reused afterwards: a second call returns
    /// [`LockError::NotHeld`] without contacting the store.
    #[instrument(skip(self), fields(lock.key = %self.key))]
    pub async fn unlock(&self, timeout: Timeout) -> LockResult<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            debug!("lock already released");
            self.release_sender.send_replace(true);
            return Err(self.not_held());
        }
        let _signal = SignalOnDrop(&self.release_sender);
        let result = with_timeout(
            timeout,
            primitives::release(self.store.as_ref(), &self.key, &self.token),
        )
        .await;
        match result? {
            true => Ok(()),
            false => Err(self.not_held()),
        }
    }

    /// Keeps the lock alive by renewing it every `interval` until
    /// [`unlock`](Self::unlock) is called.
    ///
    /// A renewal that times out is retried immediately instead of waiting for
    /// the next tick. Any other failure stops the daemon, flips
    /// [`lost_token`](Self::lost_token) and is returned. `interval` must be
    /// non-zero and shorter than the lease. Only one daemon may run per
    /// handle at a time; a new one may be started once the previous one
    /// has returned.
    #[instrument(skip(self), fields(lock.key = %self.key, lease = ?self.lease))]
    pub async fn auto_refresh(&self, interval: Duration, timeout: Duration) -> LockResult<()> {
        if interval.is_zero() || interval >= self.lease {
            return Err(LockError::InvalidArgument(format!(
                "refresh interval {interval:?} must be non-zero and below the lease {:?}",
                self.lease
            )));
        }
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return Err(LockError::AlreadyRefreshing {
                key: self.key.clone(),
            });
        }
        let _running = ClearOnDrop(&self.refreshing);

        let result = self.refresh_loop(interval, timeout).await;
        if let Err(e) = &result {
            warn!(error = %e, "auto refresh stopped");
            self.lost_sender.send_replace(true);
        }
        result
    }

    /// Spawns [`auto_refresh`](Self::auto_refresh) on the tokio runtime.
    pub fn spawn_auto_refresh(
        self: &Arc<Self>,
        interval: Duration,
        timeout: Duration,
    ) -> tokio::task::JoinHandle<LockResult<()>> {
        let lock = Arc::clone(self);
        tokio::spawn(async move { lock.auto_refresh(interval, timeout).await })
    }

    async fn refresh_loop(&self, interval: Duration, timeout: Duration) -> LockResult<()> {
        let mut release_receiver = self.release_sender.subscribe();
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut retry_now = false;

        loop {
            if retry_now {
                if *release_receiver.borrow() {
                    return Ok(());
                }
            } else {
                tokio::select! {
                    biased;
                    _ = released(&mut release_receiver) => return Ok(()),
                    _ = ticker.tick() => {}
                }
            }

            match self.refresh(Some(timeout)).await {
                Ok(()) => retry_now = false,
                Err(LockError::Timeout(_)) => {
                    warn!(timeout = ?timeout, "lock renewal timed out, retrying");
                    retry_now = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn not_held(&self) -> LockError {
        LockError::NotHeld {
            key: self.key.clone(),
        }
    }
}

/// Fires the release signal when dropped.
struct SignalOnDrop<'a>(&'a watch::Sender<bool>);

impl Drop for SignalOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Clears the running-daemon flag when dropped.
struct ClearOnDrop<'a>(&'a AtomicBool);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn released(receiver: &mut watch::Receiver<bool>) {
    // The sender lives in the handle, so the channel cannot close under us.
    let _ = receiver.wait_for(|released| *released).await;
}

impl<S: LockStore> fmt::Debug for Lock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("lease", &self.lease)
            .field("released", &self.released.load(Ordering::Acquire))
            .finish()
    }
}
