//! Lock manager: best-effort, retrying and coalesced acquisition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, field, instrument, warn, Span};

use crate::error::{LockError, LockResult};
use crate::handle::Lock;
use crate::primitives;
use crate::retry::RetryStrategy;
use crate::store::LockStore;
use crate::timeout::{cancelled, with_timeout, Timeout};

/// Outcome published to everyone waiting on one coalesced acquisition.
type Flight<S> = watch::Sender<Option<LockResult<Arc<Lock<S>>>>>;

/// Entry point for acquiring locks against a [`LockStore`].
///
/// Cloning is cheap; clones share the store and the table of in-flight
/// coalesced acquisitions.
///
/// # Example
///
/// ```rust,ignore
/// let client = LockClient::new(store);
/// let lock = client.try_lock("job-7", Duration::from_secs(60), None).await?;
/// // Critical section
/// lock.unlock(None).await?;
/// ```
pub struct LockClient<S: LockStore> {
    store: Arc<S>,
    flights: Arc<Mutex<HashMap<String, Arc<Flight<S>>>>>,
}

impl<S: LockStore> Clone for LockClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<S: LockStore> LockClient<S> {
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Creates a client over a store shared with other components.
    pub fn from_arc(store: Arc<S>) -> Self {
        Self {
            store,
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Attempts to acquire `key` exactly once.
    ///
    /// # Returns
    ///
    /// * `Ok(lock)` - Lock acquired
    /// * `Err(LockError::Contended)` - Another owner holds the key
    /// * `Err(LockError::Timeout)` - The store did not answer within `timeout`
    /// * `Err(LockError::Connection | LockError::Backend)` - Store failure
    #[instrument(skip(self), fields(lock.key = %key, acquired = field::Empty))]
    pub async fn try_lock(&self, key: &str, lease: Duration, timeout: Timeout) -> LockResult<Lock<S>> {
        validate(key, lease)?;
        let token = primitives::new_token();
        let acquired = with_timeout(
            timeout,
            primitives::acquire(self.store.as_ref(), key, &token, lease),
        )
        .await?;
        Span::current().record("acquired", acquired);
        if !acquired {
            return Err(LockError::Contended {
                key: key.to_string(),
            });
        }
        Ok(Lock::new(
            Arc::clone(&self.store),
            key.to_string(),
            token,
            lease,
        ))
    }

    /// Acquires `key`, retrying per `retry` until it succeeds, retries run
    /// out, or `cancel` fires.
    ///
    /// Each attempt is bounded by `attempt_timeout`; an attempt that times
    /// out counts as a failed attempt. Any other store error aborts the loop.
    /// One token is used for the whole call, so an attempt whose reply was
    /// lost is picked up by the next one.
    ///
    /// # Returns
    ///
    /// * `Ok(lock)` - Lock acquired
    /// * `Err(LockError::Contended)` - Retries exhausted
    /// * `Err(LockError::Cancelled)` - `cancel` fired
    /// * `Err(LockError::Connection | LockError::Backend)` - Store failure
    #[instrument(
        skip(self, retry, cancel),
        fields(lock.key = %key, attempts = field::Empty, acquired = field::Empty)
    )]
    pub async fn lock<R>(
        &self,
        key: &str,
        lease: Duration,
        mut retry: R,
        attempt_timeout: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> LockResult<Lock<S>>
    where
        R: RetryStrategy,
    {
        validate(key, lease)?;
        let token = primitives::new_token();
        let store = self.store.as_ref();

        // One timer for the whole loop, re-armed before every wait.
        let wait = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(wait);
        let mut attempts: u32 = 0;

        loop {
            if *cancel.borrow() {
                return Err(LockError::Cancelled);
            }
            attempts += 1;
            let attempt = with_timeout(
                Some(attempt_timeout),
                primitives::acquire_reentrant(store, key, &token, lease),
            );
            let outcome = tokio::select! {
                outcome = attempt => outcome,
                _ = cancelled(&mut cancel) => return Err(LockError::Cancelled),
            };
            match outcome {
                Ok(true) => {
                    Span::current().record("attempts", attempts);
                    Span::current().record("acquired", true);
                    return Ok(Lock::new(
                        Arc::clone(&self.store),
                        key.to_string(),
                        token,
                        lease,
                    ));
                }
                Ok(false) => {}
                Err(LockError::Timeout(limit)) => {
                    debug!(attempt = attempts, timeout = ?limit, "acquire attempt timed out");
                }
                Err(e) => {
                    Span::current().record("attempts", attempts);
                    return Err(e);
                }
            }

            let Some(interval) = retry.next() else {
                Span::current().record("attempts", attempts);
                Span::current().record("acquired", false);
                return Err(LockError::Contended {
                    key: key.to_string(),
                });
            };
            debug!(attempt = attempts, interval = ?interval, "lock busy, waiting to retry");
            wait.as_mut().reset(Instant::now() + interval);
            tokio::select! {
                _ = &mut wait => {}
                _ = cancelled(&mut cancel) => return Err(LockError::Cancelled),
            }
        }
    }

    /// Like [`lock`](Self::lock), but concurrent calls for the same `key`
    /// share one acquisition.
    ///
    /// The first caller for a key runs the retrying acquisition on a spawned
    /// task, driven by its own `retry`, `attempt_timeout` and `cancel`.
    /// Callers arriving while it is in flight wait for that outcome and get
    /// a clone of it: the same [`Lock`] or the same error. Every caller's own
    /// `cancel` returns [`LockError::Cancelled`] to that caller promptly. A
    /// later caller's `cancel` leaves the shared acquisition running for the
    /// others; the first caller's `cancel` also stops it, and the remaining
    /// waiters receive [`LockError::Cancelled`].
    ///
    /// # Coalesced lock
    ///
    /// Every caller receives the *same* handle and token. Do not use this
    /// when callers require independently released ownership; it suits
    /// deduplicating work inside one process. The first `unlock` releases
    /// the lock for all of them.
    #[instrument(skip(self, retry, cancel), fields(lock.key = %key, leader = field::Empty))]
    pub async fn singleflight_lock<R>(
        &self,
        key: &str,
        lease: Duration,
        retry: R,
        attempt_timeout: Duration,
        cancel: watch::Receiver<bool>,
    ) -> LockResult<Arc<Lock<S>>>
    where
        R: RetryStrategy + Send + 'static,
    {
        let mut own_cancel = cancel.clone();
        let (mut outcome, leader) = {
            let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
            match flights.get(key) {
                Some(flight) => (flight.subscribe(), false),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    let flight = Arc::new(sender);
                    flights.insert(key.to_string(), Arc::clone(&flight));
                    self.start_flight(flight, key, lease, retry, attempt_timeout, cancel);
                    (receiver, true)
                }
            }
        };
        Span::current().record("leader", leader);

        tokio::select! {
            shared = wait_outcome(&mut outcome) => shared,
            _ = cancelled(&mut own_cancel) => Err(LockError::Cancelled),
        }
    }

    fn start_flight<R>(
        &self,
        flight: Arc<Flight<S>>,
        key: &str,
        lease: Duration,
        retry: R,
        attempt_timeout: Duration,
        cancel: watch::Receiver<bool>,
    ) where
        R: RetryStrategy + Send + 'static,
    {
        let client = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let result = client
                .lock(&key, lease, retry, attempt_timeout, cancel)
                .await
                .map(Arc::new);
            client
                .flights
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);

            // Nobody is left to hand the lock to, so don't leave it held.
            if let Err(unclaimed) = flight.send(Some(result)) {
                if let Some(Ok(lock)) = unclaimed.0 {
                    warn!(lock.key = %key, "coalesced lock acquired after all callers left, releasing");
                    if let Err(e) = lock.unlock(Some(attempt_timeout)).await {
                        warn!(lock.key = %key, error = %e, "failed to release unclaimed lock");
                    }
                }
            }
        });
    }
}

async fn wait_outcome<S: LockStore>(
    outcome: &mut watch::Receiver<Option<LockResult<Arc<Lock<S>>>>>,
) -> LockResult<Arc<Lock<S>>> {
    let shared = match outcome.wait_for(Option::is_some).await {
        Ok(value) => (*value).clone(),
        Err(_) => None,
    };
    // The sender only disappears without publishing if the flight task died.
    shared.unwrap_or_else(|| Err(LockError::backend_msg("coalesced acquisition was aborted")))
}

fn validate(key: &str, lease: Duration) -> LockResult<()> {
    if key.is_empty() {
        return Err(LockError::InvalidArgument("lock key must not be empty".to_string()));
    }
    // Leases are stored with millisecond precision.
    if lease < Duration::from_millis(1) {
        return Err(LockError::InvalidArgument(format!(
            "lease {lease:?} must be at least 1ms"
        )));
    }
    Ok(())
}
