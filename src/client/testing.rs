//! Scripted API used by the client unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tokio::sync::Semaphore;

use super::dispatcher::Dispatch;
use super::request::{ApiResponse, Failure, RequestDescriptor};

/// In-memory API with a session flag and a gate on the refresh endpoint
///
/// - `/offline` never answers
/// - `/admin/*` is always forbidden
/// - `/broken` always answers 401, even with a valid session
/// - every other path answers 200 with a valid session and 401 without
pub(crate) struct FakeApi {
    session_valid: AtomicBool,
    refresh_succeeds: AtomicBool,
    refresh_calls: AtomicUsize,
    refresh_gate: Semaphore,
    calls: Mutex<Vec<(String, bool)>>,
}

impl FakeApi {
    pub(crate) const REFRESH_PATH: &'static str = "/auth/refresh";

    pub(crate) fn new() -> Self {
        Self {
            session_valid: AtomicBool::new(false),
            refresh_succeeds: AtomicBool::new(true),
            refresh_calls: AtomicUsize::new(0),
            refresh_gate: Semaphore::new(Semaphore::MAX_PERMITS),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Keep refresh calls pending until [`Self::release_refresh`]
    pub(crate) fn hold_refresh(mut self) -> Self {
        self.refresh_gate = Semaphore::new(0);
        self
    }

    pub(crate) fn refresh_fails(self) -> Self {
        self.refresh_succeeds.store(false, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_valid_session(self) -> Self {
        self.session_valid.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn release_refresh(&self) {
        self.refresh_gate.add_permits(1);
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Non-refresh calls as `(path, retried)`, in dispatch order
    pub(crate) fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().clone()
    }

    fn ok() -> ApiResponse {
        ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"ok":true}"#),
        }
    }
}

#[async_trait]
impl Dispatch for FakeApi {
    async fn send(&self, request: &RequestDescriptor) -> Result<ApiResponse, Failure> {
        if request.path == Self::REFRESH_PATH {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.refresh_gate.acquire().await {
                permit.forget();
            }
            if self.refresh_succeeds.load(Ordering::SeqCst) {
                self.session_valid.store(true, Ordering::SeqCst);
                return Ok(Self::ok());
            }
            return Err(Failure::from_status(request, StatusCode::UNAUTHORIZED, "refresh expired"));
        }

        self.calls
            .lock()
            .push((request.path.clone(), request.is_retried()));
        tokio::task::yield_now().await;

        if request.path == "/offline" {
            return Err(Failure::no_response(request, "connection refused"));
        }
        if request.path.starts_with("/admin") {
            return Err(Failure::from_status(request, StatusCode::FORBIDDEN, ""));
        }
        if request.path == "/broken" || !self.session_valid.load(Ordering::SeqCst) {
            return Err(Failure::from_status(request, StatusCode::UNAUTHORIZED, ""));
        }
        Ok(Self::ok())
    }
}

/// Yield to the runtime until `condition` holds (panics after 5s)
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}
