//! Session-scoped anti-forgery token store.
//!
//! Sessions are addressed by an opaque handle carried in a cookie. A session
//! idle longer than the configured timeout is gone: its token never verifies
//! again. Live sessions are capped per client identity and overall, and
//! expired ones are swept at most once per sweep interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::RngCore;
use tracing::{debug, warn};

use crate::domain::config::SessionConfig;
use crate::domain::token::{AntiForgeryToken, SessionRecord};
use crate::domain::types::ClientIdentity;
use crate::ports::TimeSource;

/// Random bytes per session handle
const HANDLE_BYTES: usize = 32;

/// Opaque session handle (hex)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn generate() -> Self {
        let mut bytes = [0u8; HANDLE_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accept only well-formed handles; anything else is treated as absent.
    pub fn parse(value: &str) -> Option<Self> {
        let well_formed = value.len() == HANDLE_BYTES * 2
            && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        well_formed.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 chars are enough to correlate in logs
        write!(f, "SessionHandle({}..)", &self.0[..8.min(self.0.len())])
    }
}

struct SessionEntry {
    record: SessionRecord,
    /// Identity that opened the session
    owner: ClientIdentity,
    /// Unix seconds of last use
    last_seen: u64,
}

/// Token returned by `issue`
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub handle: SessionHandle,
    pub token: AntiForgeryToken,
    /// True when a new session (and cookie) was created
    pub created: bool,
}

/// Why a new session was not opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionRefused {
    /// The client already holds its share of live sessions
    #[error("client holds too many live sessions")]
    ClientLimit,
    /// The store is at capacity
    #[error("session store is full")]
    StoreFull,
}

/// Concurrent in-process session store.
pub struct SessionStore {
    sessions: DashMap<SessionHandle, SessionEntry>,
    /// Live sessions per owning client
    owners: DashMap<ClientIdentity, usize>,
    config: SessionConfig,
    /// Unix seconds of the last sweep
    last_sweep: AtomicU64,
    clock: Arc<dyn TimeSource>,
}

impl SessionStore {
    pub fn new(config: SessionConfig, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            sessions: DashMap::new(),
            owners: DashMap::new(),
            last_sweep: AtomicU64::new(clock.now()),
            config,
            clock,
        }
    }

    fn is_expired(&self, entry: &SessionEntry, now: u64) -> bool {
        now.saturating_sub(entry.last_seen) > self.config.idle_timeout.as_secs()
    }

    /// Current token of the caller's session. A new session (and token) is
    /// opened for `client` when the handle is absent, malformed or expired,
    /// unless that would exceed the client's share or the store's capacity.
    pub fn issue(
        &self,
        handle: Option<&str>,
        client: &ClientIdentity,
    ) -> Result<IssuedToken, SessionRefused> {
        let now = self.clock.now();

        if let Some(handle) = handle.and_then(SessionHandle::parse) {
            if let Some(mut entry) = self.sessions.get_mut(&handle) {
                if !self.is_expired(&entry, now) {
                    entry.last_seen = now;
                    let token = entry.record.issue();
                    return Ok(IssuedToken {
                        handle: handle.clone(),
                        token,
                        created: false,
                    });
                }
            }
            self.remove(&handle);
        }

        self.sweep_if_due(now, self.config.sweep_interval.as_secs());
        if self.sessions.len() >= self.config.max_sessions {
            // At capacity a sweep may run once per second
            self.sweep_if_due(now, 1);
            if self.sessions.len() >= self.config.max_sessions {
                warn!(sessions = self.sessions.len(), "Session store full");
                return Err(SessionRefused::StoreFull);
            }
        }

        {
            let mut held = self.owners.entry(client.clone()).or_insert(0);
            if *held >= self.config.max_sessions_per_client {
                debug!(client = %client, held = *held, "Client session limit reached");
                return Err(SessionRefused::ClientLimit);
            }
            *held += 1;
        }

        let handle = SessionHandle::generate();
        let mut record = SessionRecord::new();
        let token = record.issue();
        self.sessions.insert(
            handle.clone(),
            SessionEntry {
                record,
                owner: client.clone(),
                last_seen: now,
            },
        );
        debug!(session = ?handle, sessions = self.sessions.len(), "Session created");

        Ok(IssuedToken {
            handle,
            token,
            created: true,
        })
    }

    /// Constant-time check of `supplied` against the session's current
    /// token. Unknown or expired sessions never verify.
    pub fn verify(&self, handle: Option<&str>, supplied: &str) -> bool {
        let Some(handle) = handle.and_then(SessionHandle::parse) else {
            return false;
        };
        let now = self.clock.now();

        match self.sessions.get_mut(&handle) {
            Some(mut entry) if !self.is_expired(&entry, now) => {
                entry.last_seen = now;
                entry.record.verify(supplied)
            }
            _ => false,
        }
    }

    /// Replace the session's token. `None` if the session is gone.
    pub fn rotate(&self, handle: Option<&str>) -> Option<AntiForgeryToken> {
        let handle = handle.and_then(SessionHandle::parse)?;
        let now = self.clock.now();

        let mut entry = self.sessions.get_mut(&handle)?;
        if self.is_expired(&entry, now) {
            return None;
        }
        entry.last_seen = now;
        Some(entry.record.rotate())
    }

    /// Sweep when at least `min_gap` seconds passed since the last sweep.
    /// Concurrent callers race for the slot; only the winner sweeps.
    fn sweep_if_due(&self, now: u64, min_gap: u64) {
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) < min_gap {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_expired();
        }
    }

    /// Drop every expired session.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| {
            let expired = self.is_expired(entry, now);
            if expired {
                self.release(&entry.owner);
            }
            !expired
        });

        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!(purged, "Expired sessions removed");
        }
    }

    fn remove(&self, handle: &SessionHandle) {
        if let Some((_, entry)) = self.sessions.remove(handle) {
            self.release(&entry.owner);
        }
    }

    fn release(&self, owner: &ClientIdentity) {
        self.owners.remove_if_mut(owner, |_, held| {
            *held = held.saturating_sub(1);
            *held == 0
        });
    }

    /// Get number of tracked sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
