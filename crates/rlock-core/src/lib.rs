//! Core protocol for distributed mutual-exclusion locks over a key-value
//! store with atomic scripts.
//!
//! Ownership lives in the store only: a [`Lock`] holds a key exactly while
//! the store maps that key to the lock's token, and every renew or release
//! re-checks this with one atomic compare-and-act round trip.

pub mod client;
pub mod error;
pub mod handle;
pub mod prelude;
pub mod primitives;
pub mod retry;
pub mod store;
pub mod timeout;

pub use error::{LockError, LockResult};
pub use prelude::*;
