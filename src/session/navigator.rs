//! Navigation surface
//!
//! The client never renders anything itself; when a session ends it asks a
//! [`Navigator`] to move the user to the entry surface.

use parking_lot::RwLock;
use tracing::info;

/// Where the user currently is, and how to send them elsewhere
pub trait Navigator: Send + Sync {
    /// Current location path
    fn current_location(&self) -> String;

    /// Move to `path`
    fn navigate(&self, path: &str);
}

/// In-process navigator that records every navigation
pub struct LocationTracker {
    current: RwLock<String>,
    history: RwLock<Vec<String>>,
}

impl LocationTracker {
    /// Start at `initial`
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(initial.into()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Every path navigated to, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.read().clone()
    }
}

impl Navigator for LocationTracker {
    fn current_location(&self) -> String {
        self.current.read().clone()
    }

    fn navigate(&self, path: &str) {
        info!(from = %self.current.read(), to = %path, "Navigating");
        *self.current.write() = path.to_string();
        self.history.write().push(path.to_string());
    }
}
