//! Conversation transcripts keyed by client-chosen session ids
//!
//! The map of sessions is guarded by a short-lived `std::sync::Mutex`; each
//! transcript has its own async lock so a turn in one session never waits on
//! another. Idle sessions expire after the configured TTL and the least
//! recently used session is evicted once the store is full. A session with a
//! turn in flight is never expired or evicted; the store may briefly exceed
//! its limit while every session is busy.


use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::{RagError, Result};

const USER_PREFIX: &str = "User: ";
const AI_PREFIX: &str = "AI: ";

/// Ordered transcript of one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<String>,
}

impl Transcript {
    #[inline]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record one exchange as a user entry followed by an AI entry
    #[inline]
    pub fn record_turn(&mut self, user_message: &str, ai_message: &str) {
        self.entries.push(format!("{}{}", USER_PREFIX, user_message));
        self.entries.push(format!("{}{}", AI_PREFIX, ai_message));
    }

    /// The transcript as prompt text, one entry per line
    #[inline]
    pub fn render(&self) -> String {
        self.entries.join("\n")
    }
}

/// Exclusive access to one session's transcript for the duration of a turn
pub type SessionGuard = OwnedMutexGuard<Transcript>;

struct SessionEntry {
    transcript: Arc<AsyncMutex<Transcript>>,
    last_access: Instant,
}

impl SessionEntry {
    /// Someone outside the map still holds the transcript
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.transcript) > 1
    }
}

/// Process-wide session memory
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    ttl: Option<Duration>,
    max_sessions: usize,
}

impl SessionStore {
    #[inline]
    pub fn new(config: &SessionConfig) -> Self {
        let ttl = (config.ttl_seconds > 0).then(|| Duration::from_secs(config.ttl_seconds));
        Self::with_limits(ttl, config.max_sessions)
    }

    /// `ttl` of `None` keeps idle sessions until capacity forces them out
    #[inline]
    pub fn with_limits(ttl: Option<Duration>, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Handle to the transcript of `session_id`, created empty if absent
    #[inline]
    pub fn open(&self, session_id: &str) -> Arc<AsyncMutex<Transcript>> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);

        self.sweep_expired(&mut sessions, now);

        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_access = now;
            return Arc::clone(&entry.transcript);
        }

        if sessions.len() >= self.max_sessions {
            evict_least_recent(&mut sessions);
        }

        debug!("Creating session {}", session_id);
        let transcript = Arc::new(AsyncMutex::new(Transcript::default()));
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                transcript: Arc::clone(&transcript),
                last_access: now,
            },
        );
        transcript
    }

    /// Lock the transcript of `session_id` for one turn, creating it if absent
    #[inline]
    pub async fn begin_turn(&self, session_id: &str) -> SessionGuard {
        self.open(session_id).lock_owned().await
    }

    /// Transcript entries of `session_id`, creating an empty session if absent
    #[inline]
    pub async fn history(&self, session_id: &str) -> Vec<String> {
        self.open(session_id).lock().await.entries().to_vec()
    }

    /// Append one exchange to an existing session
    #[inline]
    pub async fn append(
        &self,
        session_id: &str,
        user_message: &str,
        ai_message: &str,
    ) -> Result<()> {
        let transcript = self
            .existing(session_id)
            .ok_or_else(|| RagError::UnknownSession(session_id.to_string()))?;
        transcript.lock().await.record_turn(user_message, ai_message);
        Ok(())
    }

    /// Whether `session_id` is currently held in memory
    #[inline]
    pub fn contains(&self, session_id: &str) -> bool {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .is_some_and(|entry| entry.in_use() || !self.is_expired(entry, Instant::now()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn existing(&self, session_id: &str) -> Option<Arc<AsyncMutex<Transcript>>> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep_expired(&mut sessions, now);

        sessions.get_mut(session_id).map(|entry| {
            entry.last_access = now;
            Arc::clone(&entry.transcript)
        })
    }

    fn is_expired(&self, entry: &SessionEntry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.last_access) > ttl)
    }

    fn sweep_expired(&self, sessions: &mut HashMap<String, SessionEntry>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, entry| {
            if entry.in_use() {
                entry.last_access = now;
                return true;
            }
            !self.is_expired(entry, now)
        });
        let expired = before - sessions.len();
        if expired > 0 {
            info!("Expired {} idle sessions", expired);
        }
    }
}

fn evict_least_recent(sessions: &mut HashMap<String, SessionEntry>) {
    let oldest = sessions
        .iter()
        .filter(|(_, entry)| !entry.in_use())
        .min_by_key(|(_, entry)| entry.last_access)
        .map(|(id, _)| id.clone());

    match oldest {
        Some(id) => {
            info!("Session limit reached, evicting {}", id);
            sessions.remove(&id);
        }
        None => warn!("Session limit reached but every session is busy"),
    }
}
