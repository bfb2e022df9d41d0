//! 観測用のセッション一覧
//!
//! プロトコル処理はこの表を参照しない。ヘルスチェックやメトリクスのためだけに
//! 生存中のセッションを記録する。
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug)]
struct Entry {
    engine_key: String,
    peer: Option<SocketAddr>,
    opened_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub engine_key: String,
    pub peer: Option<String>,
    pub age_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    sessions: Arc<RwLock<HashMap<String, Entry>>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登録し、破棄時に自動で登録解除するガードを返す
    pub fn track(
        &self,
        session_id: &str,
        engine_key: &str,
        peer: Option<SocketAddr>,
    ) -> TrackedSession {
        self.sessions.write().insert(
            session_id.to_string(),
            Entry {
                engine_key: engine_key.to_string(),
                peer,
                opened_at: Instant::now(),
            },
        );
        TrackedSession {
            id: session_id.to_string(),
            sessions: self.sessions.clone(),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    pub fn snapshot(&self) -> Vec<SessionSummary> {
        let guard = self.sessions.read();
        let mut list: Vec<SessionSummary> = guard
            .iter()
            .map(|(id, entry)| SessionSummary {
                id: id.clone(),
                engine_key: entry.engine_key.clone(),
                peer: entry.peer.map(|p| p.to_string()),
                age_ms: duration_ms(entry.opened_at.elapsed()),
            })
            .collect();
        list.sort_by(|a, b| b.age_ms.cmp(&a.age_ms));
        list
    }
}

/// `SessionTracker::track` が返すガード
#[derive(Debug)]
pub struct TrackedSession {
    id: String,
    sessions: Arc<RwLock<HashMap<String, Entry>>>,
}

impl TrackedSession {
    pub fn set_engine(&self, engine_key: &str) {
        if let Some(entry) = self.sessions.write().get_mut(&self.id) {
            entry.engine_key = engine_key.to_string();
        }
    }
}

impl Drop for TrackedSession {
    fn drop(&mut self) {
        self.sessions.write().remove(&self.id);
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}
