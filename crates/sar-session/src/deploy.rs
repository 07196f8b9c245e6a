//! Process-wide deployment registry.
//!
//! Controller ownership is scoped to the session that issued `DEPLOY`; while
//! one deployment is active, `DEPLOY` from any other session is rejected.
//! This replaces the shared global controller the prototype grew around.

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Tracks which session, if any, currently owns a flight controller.
#[derive(Debug, Default)]
pub struct DeploymentRegistry {
    active: Mutex<Option<Uuid>>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the deployment slot for a session. Fails while another session
    /// holds it; re-claiming from the same session is a no-op success.
    pub fn try_acquire(&self, session_id: Uuid) -> bool {
        let mut active = self.active.lock();
        match *active {
            None => {
                *active = Some(session_id);
                debug!("Deployment slot acquired by session {}", session_id);
                true
            }
            Some(owner) if owner == session_id => true,
            Some(owner) => {
                warn!(
                    "Deployment rejected for session {}: session {} is active",
                    session_id, owner
                );
                false
            }
        }
    }

    /// Release the slot if this session holds it.
    pub fn release(&self, session_id: Uuid) {
        let mut active = self.active.lock();
        if *active == Some(session_id) {
            *active = None;
            debug!("Deployment slot released by session {}", session_id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_owner() {
        let registry = DeploymentRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(registry.try_acquire(first));
        assert!(!registry.try_acquire(second));
        assert!(registry.try_acquire(first)); // re-claim is a no-op

        registry.release(first);
        assert!(registry.try_acquire(second));
    }

    #[test]
    fn test_release_by_non_owner_is_ignored() {
        let registry = DeploymentRegistry::new();
        let owner = Uuid::new_v4();

        assert!(registry.try_acquire(owner));
        registry.release(Uuid::new_v4());
        assert!(registry.is_active());
    }
}
