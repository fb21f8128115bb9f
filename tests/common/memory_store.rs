//! In-memory lock store for testing the lock protocol.
//!
//! Expiry follows the tokio clock, so tests can run with paused time.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rlock_core::error::{LockError, LockResult};
use rlock_core::store::{LockStore, Script, ScriptReply};
use tokio::time::Instant;

/// Operation names used for call counting.
pub const SET_IF_ABSENT: &str = "set_if_absent";
pub const ACQUIRE: &str = "acquire";
pub const RENEW: &str = "renew";
pub const RELEASE: &str = "release";

/// Misbehavior injected into the next call of an operation.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Sleep before touching the data.
    DelayBefore(Duration),
    /// Apply the operation, then sleep before replying.
    DelayAfter(Duration),
    /// Fail with a transport error without touching the data.
    Connection,
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    calls: HashMap<&'static str, usize>,
    faults: HashMap<&'static str, VecDeque<Fault>>,
}

impl State {
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now());
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn extend(&mut self, key: &str, ttl: Duration) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at = Instant::now() + ttl;
        }
    }
}

/// Mock store holding string values with millisecond expiry.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `key = value` unconditionally, as another owner would.
    pub fn insert(&self, key: &str, value: &str, ttl: Duration) {
        let mut state = self.state.lock().unwrap();
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.state.lock().unwrap().entries.remove(key);
    }

    /// Current value, if present and not expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        state.live(key).map(|entry| entry.value.clone())
    }

    /// Remaining time to live, if present and not expired.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        state
            .live(key)
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now()))
    }

    /// Number of calls made for operation `op`.
    pub fn calls(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    /// Queues `fault` for the next call of operation `op`.
    pub fn push_fault(&self, op: &'static str, fault: Fault) {
        self.state
            .lock()
            .unwrap()
            .faults
            .entry(op)
            .or_default()
            .push_back(fault);
    }

    fn begin(&self, op: &'static str) -> Option<Fault> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_insert(0) += 1;
        state.faults.get_mut(op).and_then(VecDeque::pop_front)
    }

    async fn run<T>(&self, op: &'static str, apply: impl FnOnce(&mut State) -> T) -> LockResult<T> {
        let fault = self.begin(op);
        let mut delay_after = None;
        match fault {
            Some(Fault::DelayBefore(delay)) => tokio::time::sleep(delay).await,
            Some(Fault::DelayAfter(delay)) => delay_after = Some(delay),
            Some(Fault::Connection) => {
                return Err(LockError::connection(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            None => {}
        }
        let result = {
            let mut state = self.state.lock().unwrap();
            apply(&mut state)
        };
        if let Some(delay) = delay_after {
            tokio::time::sleep(delay).await;
        }
        Ok(result)
    }
}

fn parse_ttl(args: &[String]) -> LockResult<Duration> {
    args.get(1)
        .and_then(|millis| millis.parse::<u64>().ok())
        .map(Duration::from_millis)
        .ok_or_else(|| LockError::backend_msg("ERR value is not an integer or out of range"))
}

fn token(args: &[String]) -> LockResult<String> {
    args.first()
        .cloned()
        .ok_or_else(|| LockError::backend_msg("ERR missing token argument"))
}

impl LockStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        self.run(SET_IF_ABSENT, |state| {
            if state.live(key).is_some() {
                return false;
            }
            state.entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
            true
        })
        .await
    }

    async fn eval(&self, script: &Script, key: &str, args: &[String]) -> LockResult<ScriptReply> {
        let token = token(args)?;
        match script.name {
            "acquire" => {
                let ttl = parse_ttl(args)?;
                self.run(ACQUIRE, |state| {
                    let owned = state.live(key).map(|entry| entry.value == token);
                    match owned {
                        None => {
                            state.entries.insert(
                                key.to_string(),
                                Entry {
                                    value: token,
                                    expires_at: Instant::now() + ttl,
                                },
                            );
                            ScriptReply::Integer(1)
                        }
                        Some(true) => {
                            state.extend(key, ttl);
                            ScriptReply::Integer(1)
                        }
                        Some(false) => ScriptReply::Integer(0),
                    }
                })
                .await
            }
            "renew" => {
                let ttl = parse_ttl(args)?;
                self.run(RENEW, |state| {
                    let owned = state.live(key).map(|entry| entry.value == token);
                    match owned {
                        None => ScriptReply::Nil,
                        Some(true) => {
                            state.extend(key, ttl);
                            ScriptReply::Integer(1)
                        }
                        Some(false) => ScriptReply::Integer(0),
                    }
                })
                .await
            }
            "release" => {
                self.run(RELEASE, |state| {
                    let owned = state.live(key).map(|entry| entry.value == token);
                    match owned {
                        None => ScriptReply::Nil,
                        Some(true) => {
                            state.entries.remove(key);
                            ScriptReply::Integer(1)
                        }
                        Some(false) => ScriptReply::Integer(0),
                    }
                })
                .await
            }
            other => Err(LockError::backend_msg(format!("NOSCRIPT unknown script {other}"))),
        }
    }
}
