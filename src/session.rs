//! Per-session conversation history.
//!
//! Each session id owns its own ordered list of turns, so concurrent
//! conversations never see each other's context. History lives only for
//! the lifetime of the process. Sessions idle past the TTL are expired, and
//! the least recently used one is evicted once the store is full.

use concierge_core::models::ConversationTurn;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::SessionConfig;

pub const DEFAULT_MAX_SESSIONS: usize = 1000;
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

struct Session {
    turns: Vec<ConversationTurn>,
    last_seen: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            turns: Vec::new(),
            last_seen: Instant::now(),
        }
    }
}

/// In-memory turn history keyed by session id.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    max_turns: usize,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionStore {
    /// `max_turns` caps each session; the oldest turns are dropped first.
    pub fn new(max_turns: usize) -> Self {
        Self::with_limits(max_turns, DEFAULT_MAX_SESSIONS, DEFAULT_IDLE_TTL)
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::with_limits(
            config.max_turns,
            config.max_sessions,
            Duration::from_secs(config.idle_ttl_secs),
        )
    }

    pub fn with_limits(max_turns: usize, max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns: max_turns.max(1),
            max_sessions: max_sessions.max(1),
            idle_ttl,
        }
    }

    /// Open a new, empty session and return its id.
    pub async fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        self.make_room(&mut sessions);
        sessions.insert(id.clone(), Session::new());
        tracing::debug!(session = %id, "session created");
        id
    }

    /// Drop expired sessions, then the least recently used ones, until one
    /// more session fits.
    fn make_room(&self, sessions: &mut HashMap<String, Session>) {
        let now = Instant::now();
        sessions.retain(|id, s| {
            let live = now.duration_since(s.last_seen) < self.idle_ttl;
            if !live {
                tracing::debug!(session = %id, "session expired");
            }
            live
        });
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            tracing::debug!(session = %oldest, "session evicted");
        }
    }

    /// Whether a session is held and not yet expired.
    pub async fn exists(&self, session: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(session)
            .is_some_and(|s| s.last_seen.elapsed() < self.idle_ttl)
    }

    /// Append a turn, creating the session if it does not exist yet.
    /// Returns the session's turn count after trimming.
    pub async fn append(&self, session: &str, turn: ConversationTurn) -> usize {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(session) {
            self.make_room(&mut sessions);
        }
        let entry = sessions
            .entry(session.to_string())
            .or_insert_with(Session::new);
        entry.last_seen = Instant::now();
        entry.turns.push(turn);
        if entry.turns.len() > self.max_turns {
            let excess = entry.turns.len() - self.max_turns;
            entry.turns.drain(..excess);
        }
        entry.turns.len()
    }

    /// Snapshot of a session's turns, oldest first. Unknown ids are empty.
    pub async fn history(&self, session: &str) -> Vec<ConversationTurn> {
        self.sessions
            .read()
            .await
            .get(session)
            .map(|s| s.turns.clone())
            .unwrap_or_default()
    }

    /// Drop one session. Returns whether it existed.
    pub async fn clear(&self, session: &str) -> bool {
        let removed = self.sessions.write().await.remove(session).is_some();
        if removed {
            tracing::debug!(%session, "session cleared");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Parse a conversation transcript.
///
/// Accepts either a JSON array of `{ "role", "text" }` turns or plain
/// text, where every non-blank line is one user turn.
pub fn parse_transcript(content: &str) -> anyhow::Result<Vec<ConversationTurn>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let turns: Vec<ConversationTurn> = serde_json::from_str(trimmed)
            .map_err(|e| anyhow::anyhow!("Invalid transcript JSON: {}", e))?;
        return Ok(turns);
    }
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ConversationTurn::user)
        .collect())
}
