//! Failure classification
//!
//! Decides what the client does with a failed request. Only a first
//! `401 Unauthorized` from a regular endpoint is recovered locally; every
//! other failure goes back to the caller as-is.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info};

use super::request::{Failure, FailureKind, RequestDescriptor};
use crate::notify::Notifier;

/// How a failed request is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePath {
    /// No response reached us; surfaced unchanged
    Transport,
    /// 403: the user is notified, the failure is surfaced
    Forbidden,
    /// 401 from the refresh endpoint itself; surfaced, never refreshed
    RecursiveAuth,
    /// 401 on a request that was already replayed once; surfaced
    ExhaustedRetry,
    /// First 401 on a regular endpoint; recovered through a session refresh
    Recoverable,
    /// Any other status; surfaced unchanged
    Status,
}

impl FailurePath {
    /// Whether the client handles this failure itself
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        self == Self::Recoverable
    }
}

/// Pure classification of `failure` raised by `request`
#[must_use]
pub fn classify(failure: &Failure, request: &RequestDescriptor, refresh_path: &str) -> FailurePath {
    match failure.kind {
        FailureKind::NoResponse => FailurePath::Transport,
        FailureKind::Status(StatusCode::FORBIDDEN) => FailurePath::Forbidden,
        FailureKind::Status(StatusCode::UNAUTHORIZED) => {
            if same_endpoint(&request.path, refresh_path) {
                FailurePath::RecursiveAuth
            } else if request.is_retried() {
                FailurePath::ExhaustedRetry
            } else {
                FailurePath::Recoverable
            }
        }
        FailureKind::Status(_) => FailurePath::Status,
    }
}

/// Compare two request paths ignoring query strings and surrounding slashes
fn same_endpoint(a: &str, b: &str) -> bool {
    fn normalize(path: &str) -> &str {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        path.trim_matches('/')
    }
    normalize(a) == normalize(b)
}

/// Classifier that also applies each path's local side effects
pub struct ResponseClassifier {
    refresh_path: String,
    notifier: Arc<dyn Notifier>,
    forbidden_id: String,
    forbidden_message: String,
}

impl ResponseClassifier {
    /// Create a classifier for the given refresh endpoint
    pub fn new(
        refresh_path: impl Into<String>,
        notifier: Arc<dyn Notifier>,
        forbidden_id: impl Into<String>,
        forbidden_message: impl Into<String>,
    ) -> Self {
        Self {
            refresh_path: refresh_path.into(),
            notifier,
            forbidden_id: forbidden_id.into(),
            forbidden_message: forbidden_message.into(),
        }
    }

    /// Refresh endpoint path
    #[must_use]
    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    /// Classify `failure` and apply the side effect of its path
    ///
    /// A forbidden response fires the permission notification. A recoverable
    /// one marks `request` as retried so it can only be replayed once.
    pub fn classify(&self, failure: &Failure, request: &mut RequestDescriptor) -> FailurePath {
        let path = classify(failure, request, &self.refresh_path);

        match path {
            FailurePath::Forbidden => {
                info!(path = %request.path, "Permission denied");
                self.notifier.notify(&self.forbidden_id, &self.forbidden_message);
            }
            FailurePath::Recoverable => request.mark_retried(),
            FailurePath::RecursiveAuth => {
                debug!(path = %request.path, "Refresh endpoint rejected the session");
            }
            FailurePath::ExhaustedRetry => {
                debug!(path = %request.path, "Replayed request still unauthorized");
            }
            FailurePath::Transport | FailurePath::Status => {}
        }

        path
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use reqwest::Method;

    use super::*;

    const REFRESH: &str = "/auth/refresh";

    fn failure(request: &RequestDescriptor, status: StatusCode) -> Failure {
        Failure::from_status(request, status, "")
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl Notifier for Recorder {
        fn notify(&self, id: &str, message: &str) {
            self.0.lock().push((id.to_string(), message.to_string()));
        }
    }

    #[test]
    fn transport_failures_propagate() {
        let request = RequestDescriptor::new(Method::GET, "/deals");
        let f = Failure::no_response(&request, "timed out");
        assert_eq!(classify(&f, &request, REFRESH), FailurePath::Transport);
    }

    #[test]
    fn forbidden_never_refreshes() {
        let request = RequestDescriptor::new(Method::GET, "/admin/stores");
        let f = failure(&request, StatusCode::FORBIDDEN);
        assert_eq!(classify(&f, &request, REFRESH), FailurePath::Forbidden);
    }

    #[test]
    fn unauthorized_refresh_endpoint_is_recursive() {
        for path in ["/auth/refresh", "auth/refresh/", "/auth/refresh?source=timer"] {
            let request = RequestDescriptor::new(Method::POST, path);
            let f = failure(&request, StatusCode::UNAUTHORIZED);
            assert_eq!(classify(&f, &request, REFRESH), FailurePath::RecursiveAuth, "{path}");
        }
    }

    #[test]
    fn unauthorized_after_replay_is_exhausted() {
        let mut request = RequestDescriptor::new(Method::GET, "/wishlist");
        request.mark_retried();
        let f = failure(&request, StatusCode::UNAUTHORIZED);
        assert_eq!(classify(&f, &request, REFRESH), FailurePath::ExhaustedRetry);
    }

    #[test]
    fn first_unauthorized_is_recoverable() {
        let request = RequestDescriptor::new(Method::GET, "/wishlist");
        let f = failure(&request, StatusCode::UNAUTHORIZED);
        assert!(classify(&f, &request, REFRESH).is_recoverable());
    }

    #[test]
    fn other_statuses_propagate() {
        let request = RequestDescriptor::new(Method::GET, "/games/999");
        let f = failure(&request, StatusCode::NOT_FOUND);
        assert_eq!(classify(&f, &request, REFRESH), FailurePath::Status);
    }

    #[test]
    fn similar_paths_are_not_the_refresh_endpoint() {
        let request = RequestDescriptor::new(Method::POST, "/auth/refresh-settings");
        let f = failure(&request, StatusCode::UNAUTHORIZED);
        assert_eq!(classify(&f, &request, REFRESH), FailurePath::Recoverable);
    }

    #[test]
    fn classifier_marks_recoverable_requests_retried() {
        let notifier = Arc::new(Recorder::default());
        let classifier =
            ResponseClassifier::new(REFRESH, notifier.clone(), "forbidden", "No access");

        let mut request = RequestDescriptor::new(Method::GET, "/wishlist");
        let f = failure(&request, StatusCode::UNAUTHORIZED);

        assert_eq!(classifier.classify(&f, &mut request), FailurePath::Recoverable);
        assert!(request.is_retried());
        assert!(notifier.0.lock().is_empty());

        // A second 401 on the same descriptor is not recovered again
        assert_eq!(classifier.classify(&f, &mut request), FailurePath::ExhaustedRetry);
    }

    #[test]
    fn classifier_notifies_on_forbidden() {
        let notifier = Arc::new(Recorder::default());
        let classifier =
            ResponseClassifier::new(REFRESH, notifier.clone(), "forbidden", "No access");

        let mut request = RequestDescriptor::new(Method::DELETE, "/stores/3");
        let f = failure(&request, StatusCode::FORBIDDEN);

        assert_eq!(classifier.classify(&f, &mut request), FailurePath::Forbidden);
        assert!(!request.is_retried());
        assert_eq!(
            *notifier.0.lock(),
            vec![("forbidden".to_string(), "No access".to_string())]
        );
    }
}
