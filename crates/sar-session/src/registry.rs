//! Registry of live streaming sessions.
//!
//! Purely observational: the HTTP status endpoint reads it, nothing else
//! does. Sessions register on accept and deregister after teardown.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Connection state tracked per session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub connected_at: DateTime<Utc>,
    pub peer: String,
}

/// All currently connected streaming sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionInfo>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: Uuid, peer: impl Into<String>) {
        self.sessions.insert(
            session_id,
            SessionInfo {
                connected_at: Utc::now(),
                peer: peer.into(),
            },
        );
    }

    pub fn deregister(&self, session_id: Uuid) {
        self.sessions.remove(&session_id);
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deregister() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();

        registry.register(id, "127.0.0.1:55555");
        assert_eq!(registry.count(), 1);
        assert!(registry.ids().contains(&id));

        registry.deregister(id);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_deregister_unknown_is_harmless() {
        let registry = SessionRegistry::new();
        registry.deregister(Uuid::new_v4());
        assert_eq!(registry.count(), 0);
    }
}
