//! Single-flight session refresh
//!
//! When a request fails with `401 Unauthorized`, the session has most likely
//! expired and every other request in flight is about to fail the same way.
//! The coordinator makes sure the refresh endpoint is called once for all of
//! them:
//!
//! - The first caller moves the state from `Idle` to `Refreshing` and issues
//!   the refresh call.
//! - Callers arriving while a refresh is outstanding get a oneshot handle and
//!   wait on it.
//! - When the refresh concludes, the state returns to `Idle` and every handle
//!   is resolved exactly once, in arrival order. On failure the session
//!   terminator runs once, however many callers were waiting.
//!
//! The observe-and-commit step runs under a lock that is never held across
//! an `.await`, so two near-simultaneous failures cannot both start a
//! refresh.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Method;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::dispatcher::Dispatch;
use super::request::RequestDescriptor;
use crate::session::SessionTerminator;

/// Result of a refresh attempt, as seen by one waiting caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The session was renewed; replay the request
    Renewed,
    /// The session could not be renewed; reject with the original failure
    Failed,
}

/// Coordinator state
enum RefreshState {
    Idle,
    Refreshing {
        /// Callers suspended on the outstanding refresh, in arrival order
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

/// Owns the refresh state machine and its queue of waiting callers
pub struct RefreshCoordinator {
    dispatcher: Arc<dyn Dispatch>,
    terminator: Arc<dyn SessionTerminator>,
    refresh_path: String,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    /// Create an idle coordinator
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        terminator: Arc<dyn SessionTerminator>,
        refresh_path: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            terminator,
            refresh_path: refresh_path.into(),
            state: Mutex::new(RefreshState::Idle),
        }
    }

    /// Whether a refresh is currently outstanding
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Number of callers waiting on the outstanding refresh
    pub fn queued(&self) -> usize {
        match &*self.state.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Wait for a renewed session
    ///
    /// Starts a refresh if none is outstanding, otherwise joins the one in
    /// progress. Resolves once that refresh concludes.
    pub async fn await_refresh(&self) -> RefreshOutcome {
        let waiter = {
            let mut state = self.state.lock();
            if let RefreshState::Refreshing { waiters } = &mut *state {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                debug!(queued = waiters.len(), "Waiting on outstanding session refresh");
                Some(rx)
            } else {
                *state = RefreshState::Refreshing { waiters: Vec::new() };
                None
            }
        };

        match waiter {
            // A dropped sender means the refresh was abandoned
            Some(rx) => rx.await.unwrap_or(RefreshOutcome::Failed),
            None => self.run_refresh().await,
        }
    }

    /// Issue the refresh call and resolve everyone waiting on it
    async fn run_refresh(&self) -> RefreshOutcome {
        let attempt = Attempt::new(self);

        info!(path = %self.refresh_path, "Refreshing session");
        let request = RequestDescriptor::new(Method::POST, self.refresh_path.as_str());

        let outcome = match self.dispatcher.send(&request).await {
            Ok(_) => {
                info!("Session refreshed");
                RefreshOutcome::Renewed
            }
            Err(failure) => {
                warn!(error = %failure, "Session refresh failed");
                RefreshOutcome::Failed
            }
        };

        attempt.conclude(outcome);

        if outcome == RefreshOutcome::Failed {
            self.terminator.terminate();
        }

        outcome
    }

    /// Return to `Idle` and hand back the callers that were waiting
    fn drain(&self) -> Vec<oneshot::Sender<RefreshOutcome>> {
        match std::mem::replace(&mut *self.state.lock(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }
}

/// One in-flight refresh attempt
///
/// Dropping it without calling [`Attempt::conclude`] (the refreshing future
/// was cancelled) still returns the coordinator to `Idle`; the waiters'
/// senders are dropped with it, so each of them resolves as failed.
struct Attempt<'a> {
    coordinator: &'a RefreshCoordinator,
    concluded: bool,
}

impl<'a> Attempt<'a> {
    fn new(coordinator: &'a RefreshCoordinator) -> Self {
        Self {
            coordinator,
            concluded: false,
        }
    }

    fn conclude(mut self, outcome: RefreshOutcome) {
        self.concluded = true;
        let waiters = self.coordinator.drain();

        debug!(waiters = waiters.len(), ?outcome, "Resolving queued requests");
        for tx in waiters {
            // The waiting caller may have been cancelled in the meantime
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.concluded {
            let abandoned = self.coordinator.drain();
            warn!(waiters = abandoned.len(), "Session refresh abandoned");
        }
    }
}
