//! Redis store for distributed locks.
//!
//! [`RedisLockStore`] implements [`LockStore`](rlock_core::store::LockStore)
//! with `SET NX PX` and `EVAL` of the lock scripts, on a single Redis server.

pub mod provider;
pub mod store;

pub use provider::RedisLockStoreBuilder;
pub use store::RedisLockStore;
