//! Per-session conversation history.
//!
//! Sessions are keyed in a concurrent map; each session's turns live
//! behind their own async mutex so appends from concurrent requests
//! serialize in arrival order and never interleave. Turns are immutable
//! once appended and only removed by whole-session eviction or by the
//! bounding policy folding them into the rolling summary.

use std::collections::VecDeque;
use std::sync::Arc;

use ao_core::types::{Role, SessionId, Turn};
use chrono::{DateTime, Utc};
use config::ContextConfig;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

// Condensed overflow lines retained in the rolling summary.
const SUMMARY_LINES: usize = 12;
const SUMMARY_SNIPPET_CHARS: usize = 96;

struct SessionState {
    turns: VecDeque<Turn>,
    next_seq: u64,
    summary: VecDeque<String>,
    dropped_turns: u64,
    created_at: DateTime<Utc>,
    last_access: DateTime<Utc>
}

impl SessionState {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            turns: VecDeque::new(),
            next_seq: 0,
            summary: VecDeque::new(),
            dropped_turns: 0,
            created_at: now,
            last_access: now
        }
    }

    fn summary_turn(&self) -> Option<Turn> {
        if self.summary.is_empty() {
            return None;
        }
        let lines: Vec<&str> = self.summary.iter().map(String::as_str).collect();
        let content = format!(
            "Earlier conversation ({} turns condensed):\n{}",
            self.dropped_turns,
            lines.join("\n")
        );
        Some(Turn {
            role: Role::System,
            content,
            result: None,
            seq: 0,
            created_at: self.created_at
        })
    }
}

pub struct ContextStore {
    sessions: DashMap<SessionId, Arc<Mutex<SessionState>>>,
    config: ContextConfig
}

impl ContextStore {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config
        }
    }

    fn session(&self, id: &SessionId) -> Arc<Mutex<SessionState>> {
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new())))
            .clone()
    }

    /// Appends a turn, assigning its sequence number under the session
    /// lock. Returns the assigned sequence number.
    pub async fn append(&self, id: &SessionId, mut turn: Turn) -> u64 {
        let session = self.session(id);
        let mut state = session.lock().await;

        turn.seq = state.next_seq;
        state.next_seq += 1;
        state.last_access = Utc::now();
        state.turns.push_back(turn);

        // Bounding: fold the oldest turns into the rolling summary (or
        // drop them outright), never a retained turn.
        while state.turns.len() > self.config.max_turns {
            if let Some(old) = state.turns.pop_front() {
                state.dropped_turns += 1;
                if self.config.summarize_overflow {
                    let snippet: String = old.content.chars().take(SUMMARY_SNIPPET_CHARS).collect();
                    state.summary.push_back(format!("[{}] {}", old.role, snippet));
                    while state.summary.len() > SUMMARY_LINES {
                        state.summary.pop_front();
                    }
                }
            }
        }

        state.next_seq - 1
    }

    /// Returns the most recent `window` turns in order. When overflow has
    /// been summarized, the summary leads the slice as a synthetic system
    /// turn.
    pub async fn read(&self, id: &SessionId, window: usize) -> Vec<Turn> {
        let Some(session) = self.sessions.get(id).map(|s| s.clone()) else {
            return Vec::new();
        };
        let mut state = session.lock().await;
        state.last_access = Utc::now();

        let skip = state.turns.len().saturating_sub(window);
        let mut slice: Vec<Turn> = Vec::new();
        if let Some(summary) = state.summary_turn() {
            slice.push(summary);
        }
        slice.extend(state.turns.iter().skip(skip).cloned());
        slice
    }

    /// Deterministic hash of the context slice a prompt would be built
    /// from; feeds the request fingerprint.
    pub async fn context_hash(&self, id: &SessionId, window: usize) -> String {
        let slice = self.read(id, window).await;
        hash_slice(&slice)
    }

    /// Evicts sessions idle longer than the configured TTL; returns how
    /// many were removed.
    pub fn evict_idle(&self) -> usize {
        let now = Utc::now();
        let ttl = self.config.session_ttl_seconds as i64;
        let before = self.sessions.len();

        self.sessions.retain(|id, session| {
            match session.try_lock() {
                Ok(state) => {
                    let keep = now.signed_duration_since(state.last_access).num_seconds() < ttl;
                    if !keep {
                        debug!(session_id = %id, "Evicting idle session");
                    }
                    keep
                }
                // A locked session is in use; never evict it.
                Err(_) => true
            }
        });

        before - self.sessions.len()
    }

    /// Spawns the periodic idle-session sweep.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let interval =
            std::time::Duration::from_secs(self.config.session_ttl_seconds.clamp(1, 300));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.evict_idle();
            }
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Deterministic hash over an already-read context slice, so callers that
/// hold the slice don't re-read the session.
pub fn hash_slice(slice: &[Turn]) -> String {
    let mut hasher = Sha256::new();
    for turn in slice {
        hasher.update(turn.role.to_string().as_bytes());
        hasher.update(b"\x1f");
        hasher.update(turn.seq.to_le_bytes());
        hasher.update(turn.content.as_bytes());
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_turns: usize) -> ContextStore {
        ContextStore::new(ContextConfig {
            max_turns,
            session_ttl_seconds: 3600,
            summarize_overflow: true
        })
    }

    fn sid(tag: &str) -> SessionId {
        SessionId::new(tag)
    }

    #[tokio::test]
    async fn appends_assign_monotonic_sequence_numbers() {
        let store = store(10);
        let id = sid("s1");

        for i in 0..5 {
            let seq = store.append(&id, Turn::new(Role::User, format!("m{i}"))).await;
            assert_eq!(seq, i);
        }

        let turns = store.read(&id, 10).await;
        assert_eq!(turns.len(), 5);
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.seq, i as u64);
        }
    }

    #[tokio::test]
    async fn read_returns_most_recent_window() {
        let store = store(10);
        let id = sid("s1");
        for i in 0..6 {
            store.append(&id, Turn::new(Role::User, format!("m{i}"))).await;
        }

        let turns = store.read(&id, 2).await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "m4");
        assert_eq!(turns[1].content, "m5");
    }

    #[tokio::test]
    async fn overflow_is_summarized_not_truncated() {
        let store = store(3);
        let id = sid("s1");
        for i in 0..5 {
            store.append(&id, Turn::new(Role::User, format!("message number {i}"))).await;
        }

        let turns = store.read(&id, 10).await;
        // Summary turn + 3 retained turns
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].role, Role::System);
        assert!(turns[0].content.contains("message number 0"));
        assert!(turns[0].content.contains("2 turns condensed"));
        // Retained turns are intact, not clipped
        assert_eq!(turns[1].content, "message number 2");
    }

    #[tokio::test]
    async fn concurrent_appends_never_interleave() {
        let store = Arc::new(store(200));
        let id = sid("s1");

        let mut handles = Vec::new();
        for task in 0..8 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..20 {
                    store.append(&id, Turn::new(Role::User, format!("t{task}-{i}"))).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let turns = store.read(&id, 200).await;
        assert_eq!(turns.len(), 160);
        // Sequence numbers are a strict prefix-consistent run
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(turn.seq, i as u64);
        }
        // Per-task message order is preserved
        for task in 0..8 {
            let of_task: Vec<&Turn> = turns
                .iter()
                .filter(|t| t.content.starts_with(&format!("t{task}-")))
                .collect();
            for (i, turn) in of_task.iter().enumerate() {
                assert_eq!(turn.content, format!("t{task}-{i}"));
            }
        }
    }

    #[tokio::test]
    async fn context_hash_is_stable_and_slice_sensitive() {
        let store = store(10);
        let id = sid("s1");
        store.append(&id, Turn::new(Role::User, "hello")).await;

        let h1 = store.context_hash(&id, 5).await;
        let h2 = store.context_hash(&id, 5).await;
        assert_eq!(h1, h2);

        store.append(&id, Turn::new(Role::Assistant, "hi")).await;
        let h3 = store.context_hash(&id, 5).await;
        assert_ne!(h1, h3);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_wholesale() {
        let store = ContextStore::new(ContextConfig {
            max_turns: 10,
            session_ttl_seconds: 0,
            summarize_overflow: true
        });
        let id = sid("s1");
        store.append(&id, Turn::new(Role::User, "hello")).await;
        assert_eq!(store.session_count(), 1);

        let evicted = store.evict_idle();
        assert_eq!(evicted, 1);
        assert_eq!(store.session_count(), 0);
        assert!(store.read(&id, 10).await.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let store = store(10);
        store.append(&sid("a"), Turn::new(Role::User, "in a")).await;
        store.append(&sid("b"), Turn::new(Role::User, "in b")).await;

        let a = store.read(&sid("a"), 10).await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].content, "in a");
    }
}
