//! Atomic lock primitives.
//!
//! Each function is exactly one round trip to the store. A failed
//! compare-and-act leaves the store untouched.

use std::time::Duration;

use uuid::Uuid;

use crate::error::LockResult;
use crate::store::{ttl_arg, LockStore, ACQUIRE_SCRIPT, RELEASE_SCRIPT, RENEW_SCRIPT};

/// Generates a fresh ownership token (random 128-bit UUID).
pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Sets `key = token` if `key` is absent.
pub async fn acquire<S: LockStore + ?Sized>(
    store: &S,
    key: &str,
    token: &str,
    ttl: Duration,
) -> LockResult<bool> {
    store.set_if_absent(key, token, ttl).await
}

/// Like [`acquire`], but also succeeds (re-applying `ttl`) when the store
/// already holds `token`, so a retry loop can repeat an attempt whose reply
/// was lost.
pub async fn acquire_reentrant<S: LockStore + ?Sized>(
    store: &S,
    key: &str,
    token: &str,
    ttl: Duration,
) -> LockResult<bool> {
    let args = [token.to_string(), ttl_arg(ttl)];
    let reply = store.eval(&ACQUIRE_SCRIPT, key, &args).await?;
    Ok(reply.is_affirmative())
}

/// Resets the expiry of `key` to `ttl` if it still holds `token`.
///
/// An absent key is "not held", not an error.
pub async fn renew<S: LockStore + ?Sized>(
    store: &S,
    key: &str,
    token: &str,
    ttl: Duration,
) -> LockResult<bool> {
    let args = [token.to_string(), ttl_arg(ttl)];
    let reply = store.eval(&RENEW_SCRIPT, key, &args).await?;
    Ok(reply.is_affirmative())
}

/// Deletes `key` if it still holds `token`.
pub async fn release<S: LockStore + ?Sized>(store: &S, key: &str, token: &str) -> LockResult<bool> {
    let args = [token.to_string()];
    let reply = store.eval(&RELEASE_SCRIPT, key, &args).await?;
    Ok(reply.is_affirmative())
}
