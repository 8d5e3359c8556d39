//! User-facing notifications
//!
//! The client only emits one kind of notification itself (the "insufficient
//! permission" signal on HTTP 403), but it can fire many times in a burst.
//! [`DedupNotifier`] collapses repeats of the same id inside a time window.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

/// Sink for user-visible notifications
pub trait Notifier: Send + Sync {
    /// Show `message`; `id` identifies the notification for deduplication
    fn notify(&self, id: &str, message: &str);
}

/// Renders notifications as log events
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, id: &str, message: &str) {
        warn!(notification = %id, "{message}");
    }
}

/// Drops repeats of the same notification id within `window`
pub struct DedupNotifier<N> {
    inner: N,
    window: Duration,
    last_shown: DashMap<String, Instant>,
}

impl<N: Notifier> DedupNotifier<N> {
    /// Wrap `inner`, suppressing repeats for `window`
    pub fn new(inner: N, window: Duration) -> Self {
        Self {
            inner,
            window,
            last_shown: DashMap::new(),
        }
    }

    /// The wrapped notifier
    pub fn inner(&self) -> &N {
        &self.inner
    }
}

impl<N: Notifier> Notifier for DedupNotifier<N> {
    fn notify(&self, id: &str, message: &str) {
        let now = Instant::now();
        let mut fire = true;

        self.last_shown
            .entry(id.to_string())
            .and_modify(|shown| {
                if now.duration_since(*shown) < self.window {
                    fire = false;
                } else {
                    *shown = now;
                }
            })
            .or_insert(now);

        if fire {
            self.inner.notify(id, message);
        } else {
            debug!(notification = %id, "Suppressed duplicate notification");
        }
    }
}
