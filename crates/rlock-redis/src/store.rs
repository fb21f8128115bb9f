//! Redis implementation of the lock store.

use std::time::Duration;

use fred::prelude::*;
use rlock_core::error::{LockError, LockResult};
use rlock_core::store::{LockStore, Script, ScriptReply};
use tokio::time::Instant;
use tracing::instrument;

use crate::provider::RedisLockStoreBuilder;

/// A [`LockStore`] backed by one Redis server.
#[derive(Clone)]
pub struct RedisLockStore {
    client: RedisClient,
    key_prefix: String,
}

impl RedisLockStore {
    pub(crate) fn from_parts(client: RedisClient, key_prefix: String) -> Self {
        Self { client, key_prefix }
    }

    /// Returns a new builder for configuring the store.
    pub fn builder() -> RedisLockStoreBuilder {
        RedisLockStoreBuilder::new()
    }

    /// Connects to the Redis server at `url` with default settings.
    pub async fn new(url: impl Into<String>) -> LockResult<Self> {
        Self::builder().url(url).build().await
    }

    /// The underlying fred client.
    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    /// Redis key for a lock key.
    pub fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Maps a fred error for a command issued at `started`. A command timeout
    /// reports how long the command actually ran, whichever client enforced it.
    fn map_err(&self, op: &str, started: Instant, e: RedisError) -> LockError {
        let kind = e.kind().clone();
        match kind {
            RedisErrorKind::Timeout => LockError::Timeout(started.elapsed()),
            RedisErrorKind::IO | RedisErrorKind::Canceled => LockError::connection(e),
            _ => LockError::backend(std::io::Error::other(format!("Redis {op} failed: {e}"))),
        }
    }
}

impl LockStore for RedisLockStore {
    #[instrument(skip(self, value), fields(backend = "redis"))]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        let expiry_millis = ttl.as_millis() as i64;
        let started = Instant::now();

        // SET NX returns Some(value) if the key was set, None if it already exists
        let result: Option<String> = self
            .client
            .set(
                self.redis_key(key),
                value,
                Some(Expiration::PX(expiry_millis)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| self.map_err("SET NX", started, e))?;

        Ok(result.is_some())
    }

    #[instrument(skip(self, script, args), fields(backend = "redis", script = script.name))]
    async fn eval(&self, script: &Script, key: &str, args: &[String]) -> LockResult<ScriptReply> {
        let started = Instant::now();
        let reply: RedisValue = self
            .client
            .eval(script.body, self.redis_key(key), args.to_vec())
            .await
            .map_err(|e| self.map_err("EVAL", started, e))?;

        match reply {
            RedisValue::Integer(n) => Ok(ScriptReply::Integer(n)),
            RedisValue::Boolean(b) => Ok(ScriptReply::Integer(i64::from(b))),
            RedisValue::Null => Ok(ScriptReply::Nil),
            other => Err(LockError::backend_msg(format!(
                "unexpected reply to script {}: {other:?}",
                script.name
            ))),
        }
    }
}
