//! API client with transparent session refresh
//!
//! Every request goes through one pipeline:
//!
//! 1. [`Dispatch::send`] issues the request with the current session.
//! 2. On failure, [`ResponseClassifier`] picks a [`FailurePath`].
//! 3. A first `401` waits on the [`RefreshCoordinator`]; if the session was
//!    renewed the request is replayed once, otherwise the caller gets the
//!    original failure back.

mod classifier;
mod coordinator;
mod dispatcher;
mod request;
#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{FailurePath, ResponseClassifier, classify};
pub use coordinator::{RefreshCoordinator, RefreshOutcome};
pub use dispatcher::{Dispatch, HttpDispatcher};
pub use request::{ApiResponse, Failure, FailureKind, RequestDescriptor};

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::Result;
use crate::config::Config;
use crate::notify::Notifier;
use crate::session::{LocalSessionTerminator, Navigator, SessionStore, SessionTerminator};

/// Shared client for the deal-tracking API
pub struct ApiClient {
    dispatcher: Arc<dyn Dispatch>,
    classifier: ResponseClassifier,
    coordinator: RefreshCoordinator,
}

impl ApiClient {
    /// Build the HTTP pipeline described by `config`
    ///
    /// The session store lives at the configured path (or the default
    /// location); the terminator clears it and redirects through `navigator`.
    pub fn from_config(
        config: &Config,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let store = Arc::new(SessionStore::open(config.session.resolve_store_path()?)?);
        Self::with_store(config, store, navigator, notifier)
    }

    /// Like [`Self::from_config`], with an explicit session store
    pub fn with_store(
        config: &Config,
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let dispatcher = Arc::new(HttpDispatcher::new(&config.api, store.clone())?);
        let terminator = Arc::new(LocalSessionTerminator::new(
            store,
            navigator,
            config.session.entry_path.clone(),
        ));
        let classifier = ResponseClassifier::new(
            config.session.refresh_path.clone(),
            notifier,
            config.notifications.forbidden_id.clone(),
            config.notifications.forbidden_message.clone(),
        );

        Ok(Self::new(dispatcher, classifier, terminator))
    }

    /// Assemble a client from its parts
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        classifier: ResponseClassifier,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Self {
        let coordinator =
            RefreshCoordinator::new(dispatcher.clone(), terminator, classifier.refresh_path());
        Self {
            dispatcher,
            classifier,
            coordinator,
        }
    }

    /// The refresh coordinator (read-only diagnostics)
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send a request, refreshing the session and replaying once on a 401
    pub async fn send(
        &self,
        mut request: RequestDescriptor,
    ) -> std::result::Result<ApiResponse, Failure> {
        loop {
            let failure = match self.dispatcher.send(&request).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            if !self.classifier.classify(&failure, &mut request).is_recoverable() {
                return Err(failure);
            }

            match self.coordinator.await_refresh().await {
                RefreshOutcome::Renewed => {
                    debug!(method = %request.method, path = %request.path, "Replaying request");
                }
                RefreshOutcome::Failed => return Err(failure),
            }
        }
    }

    /// `GET path`
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        Ok(self.send(RequestDescriptor::new(Method::GET, path)).await?)
    }

    /// `GET path`, decoding the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get(path).await?.json()
    }

    /// `POST path` with a JSON body
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse> {
        let request = RequestDescriptor::new(Method::POST, path).json(body)?;
        Ok(self.send(request).await?)
    }

    /// `PUT path` with a JSON body
    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse> {
        let request = RequestDescriptor::new(Method::PUT, path).json(body)?;
        Ok(self.send(request).await?)
    }

    /// `DELETE path`
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        Ok(self.send(RequestDescriptor::new(Method::DELETE, path)).await?)
    }
}
