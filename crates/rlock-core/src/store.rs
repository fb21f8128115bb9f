//! The key-value store seam.
//!
//! Locks never keep ownership state of their own: every decision is a single
//! atomic round trip against a [`LockStore`]. Backends implement two calls, a
//! plain set-if-absent and a scripted compare-and-act against one key.

use std::future::Future;
use std::time::Duration;

use crate::error::LockResult;

/// A Lua script that runs atomically against a single key.
///
/// `name` identifies the script for stores that cannot execute Lua and
/// dispatch on it instead (in-memory test stores, for one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Script {
    pub name: &'static str,
    pub body: &'static str,
}

/// Sets `KEYS[1] = ARGV[1]` with a `ARGV[2]` millisecond expiry when the key
/// is absent, or re-applies the expiry when it already holds `ARGV[1]`.
pub const ACQUIRE_SCRIPT: Script = Script {
    name: "acquire",
    body: r#"
        local val = redis.call('get', KEYS[1])
        if val == false then
            redis.call('set', KEYS[1], ARGV[1], 'PX', ARGV[2])
            return 1
        elseif val == ARGV[1] then
            redis.call('pexpire', KEYS[1], ARGV[2])
            return 1
        end
        return 0
    "#,
};

/// Resets the expiry of `KEYS[1]` to `ARGV[2]` milliseconds if it holds `ARGV[1]`.
pub const RENEW_SCRIPT: Script = Script {
    name: "renew",
    body: r#"
        if redis.call('get', KEYS[1]) == ARGV[1] then
            return redis.call('pexpire', KEYS[1], ARGV[2])
        end
        return 0
    "#,
};

/// Deletes `KEYS[1]` if it holds `ARGV[1]`.
pub const RELEASE_SCRIPT: Script = Script {
    name: "release",
    body: r#"
        if redis.call('get', KEYS[1]) == ARGV[1] then
            return redis.call('del', KEYS[1])
        end
        return 0
    "#,
};

/// Reply of a script execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptReply {
    Integer(i64),
    /// The store reported the key (or the reply) as absent.
    Nil,
}

impl ScriptReply {
    /// True when the script reports that it acted (a reply of `1`).
    pub fn is_affirmative(&self) -> bool {
        matches!(self, Self::Integer(1))
    }
}

/// A key-value store that supports atomic scripted operations.
///
/// Implementations map transport failures to [`LockError::Connection`],
/// protocol failures to [`LockError::Backend`] and store-side command
/// timeouts to [`LockError::Timeout`].
///
/// [`LockError::Connection`]: crate::LockError::Connection
/// [`LockError::Backend`]: crate::LockError::Backend
/// [`LockError::Timeout`]: crate::LockError::Timeout
pub trait LockStore: Send + Sync + 'static {
    /// Sets `key = value` with expiry `ttl` only if `key` does not exist.
    ///
    /// Returns `true` if the value was written.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Runs `script` atomically against `key` with `args`.
    fn eval(
        &self,
        script: &Script,
        key: &str,
        args: &[String],
    ) -> impl Future<Output = LockResult<ScriptReply>> + Send;
}

/// Expiry argument for the scripts, in milliseconds.
pub(crate) fn ttl_arg(ttl: Duration) -> String {
    ttl.as_millis().to_string()
}
