//! HTTP request dispatch
//!
//! Sends a [`RequestDescriptor`] to the API and reports the outcome. The
//! dispatcher attaches the stored session cookies to every request and
//! records any cookies the server sets, but knows nothing about refreshing
//! an expired session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::{debug, trace};
use url::Url;

use super::request::{ApiResponse, Failure, RequestDescriptor};
use crate::config::ApiConfig;
use crate::session::SessionStore;
use crate::{Error, Result};

/// Sends one request and returns its outcome
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Send `request`; non-2xx responses and transport errors are failures
    async fn send(&self, request: &RequestDescriptor) -> std::result::Result<ApiResponse, Failure>;
}

/// Dispatcher backed by a `reqwest` client
pub struct HttpDispatcher {
    client: Client,
    base_url: Url,
    session: Arc<SessionStore>,
}

impl HttpDispatcher {
    /// Create a dispatcher for the configured API
    pub fn new(config: &ApiConfig, session: Arc<SessionStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url()?,
            session,
        })
    }

    /// API base URL every request path is resolved against
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request path against the base URL
    ///
    /// Paths are always relative to the API root, so a leading `/` does not
    /// escape the base URL's own path prefix. Only the part before any query
    /// or fragment may not carry a scheme.
    fn resolve(&self, path: &str) -> std::result::Result<Url, String> {
        let target = path.split(['?', '#']).next().unwrap_or(path);
        if Url::parse(target).is_ok() {
            return Err(format!("Absolute URLs are not allowed: {path}"));
        }

        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| format!("Invalid request path {path}: {e}"))
    }
}

#[async_trait]
impl Dispatch for HttpDispatcher {
    async fn send(&self, request: &RequestDescriptor) -> std::result::Result<ApiResponse, Failure> {
        let url = self
            .resolve(&request.path)
            .map_err(|e| Failure::no_response(request, e))?;

        let mut builder = self.client.request(request.method.clone(), url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(cookie) = self.session.cookie_header() {
            builder = builder.header(header::COOKIE, cookie);
        } else {
            trace!(path = %request.path, "Sending request without a session");
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!(
            method = %request.method,
            path = %request.path,
            retried = request.is_retried(),
            "Dispatching request"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| Failure::no_response(request, format!("Request failed: {e}")))?;

        for value in response.headers().get_all(header::SET_COOKIE) {
            if let Ok(cookie) = value.to_str() {
                self.session.absorb_set_cookie(cookie);
            }
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            Failure::no_response(request, format!("Failed to read response body: {e}"))
        })?;

        if !status.is_success() {
            debug!(method = %request.method, path = %request.path, %status, "Request failed");
            return Err(Failure::from_status(
                request,
                status,
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(base: &str) -> HttpDispatcher {
        let config = ApiConfig {
            base_url: base.to_string(),
            ..ApiConfig::default()
        };
        HttpDispatcher::new(&config, Arc::new(SessionStore::in_memory())).unwrap()
    }

    #[test]
    fn resolves_paths_under_base_prefix() {
        let d = dispatcher("https://deals.example.com/api");
        assert_eq!(
            d.resolve("/games/42").unwrap().as_str(),
            "https://deals.example.com/api/games/42"
        );
        assert_eq!(
            d.resolve("deals?store=steam").unwrap().as_str(),
            "https://deals.example.com/api/deals?store=steam"
        );
        assert_eq!(
            d.resolve("/deals?redirect=https://store.steampowered.com/app/1")
                .unwrap()
                .as_str(),
            "https://deals.example.com/api/deals?redirect=https://store.steampowered.com/app/1"
        );
    }

    #[test]
    fn rejects_absolute_urls() {
        let d = dispatcher("https://deals.example.com/api/");
        assert!(d.resolve("https://evil.example.com/steal").is_err());
        assert!(d.resolve("https://evil.example.com/steal?next=/deals").is_err());
        assert!(d.resolve("/games/7#https://evil.example.com").is_ok());
    }

    #[tokio::test]
    async fn unreachable_host_is_no_response() {
        // Port 9 (discard) on localhost is closed in test environments
        let d = dispatcher("http://127.0.0.1:9/api/");
        let request = RequestDescriptor::new(reqwest::Method::GET, "/deals");

        let failure = d.send(&request).await.unwrap_err();
        assert_eq!(failure.status(), None);
        assert_eq!(failure.path, "/deals");
    }
}
