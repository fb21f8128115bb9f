//! Redis store configuration.

use std::time::Duration;

use fred::prelude::*;
use rlock_core::error::{LockError, LockResult};
use tracing::debug;

use crate::store::RedisLockStore;

/// Builder for [`RedisLockStore`].
pub struct RedisLockStoreBuilder {
    url: Option<String>,
    client: Option<RedisClient>,
    key_prefix: String,
    command_timeout: Option<Duration>,
}

impl RedisLockStoreBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: None,
            client: None,
            key_prefix: String::new(),
            command_timeout: None,
        }
    }

    /// Sets the Redis server URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses an existing, already connected Redis client.
    ///
    /// Takes precedence over [`url`](Self::url).
    pub fn client(mut self, client: RedisClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Prepends `prefix` to every lock key, e.g. `"lock:"`.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets a client-side timeout for every command.
    ///
    /// Only applies to clients created from a URL.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Builds the store, connecting if a URL was given.
    pub async fn build(self) -> LockResult<RedisLockStore> {
        if let Some(client) = self.client {
            return Ok(RedisLockStore::from_parts(client, self.key_prefix));
        }

        let Some(url) = self.url else {
            return Err(LockError::InvalidArgument(
                "no Redis client or URL provided".to_string(),
            ));
        };
        let config = RedisConfig::from_url(&url).map_err(|e| {
            LockError::InvalidArgument(format!("invalid Redis URL {url:?}: {e}"))
        })?;
        let perf = self.command_timeout.map(|timeout| PerformanceConfig {
            default_command_timeout: timeout,
            ..Default::default()
        });

        let client = RedisClient::new(config, perf, None, None);
        client.connect();
        client
            .wait_for_connect()
            .await
            .map_err(LockError::connection)?;
        debug!(url = %url, "connected to Redis");

        Ok(RedisLockStore::from_parts(client, self.key_prefix))
    }
}

impl Default for RedisLockStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
