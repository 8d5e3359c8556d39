//! Session termination
//!
//! Runs when the session can no longer be renewed: the stored credentials
//! are dropped and the user is sent back to the entry surface.

use std::sync::Arc;

use tracing::{debug, warn};

use super::navigator::Navigator;
use super::store::SessionStore;

/// Terminal action for a session that cannot be refreshed
pub trait SessionTerminator: Send + Sync {
    /// Clear local credentials and return to the entry surface
    fn terminate(&self);
}

/// Terminator that clears a [`SessionStore`] and navigates to `entry_path`
pub struct LocalSessionTerminator {
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    entry_path: String,
}

impl LocalSessionTerminator {
    /// Create a terminator for `store` that redirects to `entry_path`
    pub fn new(
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        entry_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            navigator,
            entry_path: entry_path.into(),
        }
    }
}

impl SessionTerminator for LocalSessionTerminator {
    fn terminate(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear session store");
        }

        if self.navigator.current_location() == self.entry_path {
            debug!(entry = %self.entry_path, "Already at entry surface");
            return;
        }

        warn!(entry = %self.entry_path, "Session ended, returning to entry surface");
        self.navigator.navigate(&self.entry_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LocationTracker;

    #[test]
    fn terminate_clears_store_and_redirects() {
        let store = Arc::new(SessionStore::in_memory());
        store.set("session", "stale");
        let nav = Arc::new(LocationTracker::new("/wishlist"));

        let terminator = LocalSessionTerminator::new(store.clone(), nav.clone(), "/login");
        terminator.terminate();

        assert!(store.is_empty());
        assert_eq!(nav.current_location(), "/login");
    }

    #[test]
    fn terminate_at_entry_does_not_renavigate() {
        let store = Arc::new(SessionStore::in_memory());
        let nav = Arc::new(LocationTracker::new("/wishlist"));
        let terminator = LocalSessionTerminator::new(store, nav.clone(), "/login");

        terminator.terminate();
        terminator.terminate();

        assert_eq!(nav.history(), vec!["/login".to_string()]);
    }
}
