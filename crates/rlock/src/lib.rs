//! Distributed mutual-exclusion locks over a key-value store with atomic
//! scripts.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rlock::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RedisLockStore::new("redis://localhost:6379").await?;
//!     let client = LockClient::new(store);
//!
//!     // Retry every 100ms, up to 10 times, 1s per attempt
//!     let lock = client
//!         .lock(
//!             "job-7",
//!             Duration::from_secs(60),
//!             FixedIntervalRetry::new(Duration::from_millis(100), 10),
//!             Duration::from_secs(1),
//!             never_cancelled(),
//!         )
//!         .await?;
//!
//!     // Keep the lease alive while we work
//!     let lock = Arc::new(lock);
//!     let daemon = lock.spawn_auto_refresh(Duration::from_secs(20), Duration::from_secs(1));
//!
//!     println!("Doing critical work...");
//!
//!     lock.unlock(Some(Duration::from_secs(1))).await?;
//!     daemon.await??;
//!     Ok(())
//! }
//! ```
//!
//! # Operations
//!
//! - **`try_lock`**: one attempt, fails with `LockError::Contended` if held
//! - **`lock`**: retries per a `RetryStrategy`, honoring a cancellation signal
//! - **`singleflight_lock`**: coalesces concurrent acquisitions of one key
//!   within the process; all callers share a single handle
//! - **`Lock::auto_refresh`**: renews the lease until `unlock`
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `rlock-core`: lock protocol, handle, manager and the `LockStore` trait
//! - `rlock-redis`: Redis store built on `fred`

// Re-export core types and traits
pub use rlock_core::*;

// Re-export redis store
#[allow(ambiguous_glob_reexports)]
pub use rlock_redis::*;
