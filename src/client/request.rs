//! Request descriptors and dispatch outcomes
//!
//! A [`RequestDescriptor`] captures everything needed to issue a request a
//! second time. The only thing that ever changes after creation is the
//! `retried` flag, which flips once when the request is replayed after a
//! session refresh.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// Everything needed to (re-)issue one API request
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: Method,
    /// Target path, relative to the configured API base URL
    pub path: String,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<Bytes>,
    retried: bool,
}

impl RequestDescriptor {
    /// Create a descriptor with no headers and no body
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            retried: false,
        }
    }

    /// Add a request header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a raw request body
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON request body
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self
            .header(header::CONTENT_TYPE.as_str(), "application/json")
            .body(body))
    }

    /// Whether this request has already been replayed once
    #[must_use]
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// A successful (2xx) API response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Bytes,
}

impl ApiResponse {
    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as (lossy) UTF-8 text
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// How a request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No response reached us (connect error, timeout, bad request URL)
    NoResponse,
    /// The server answered with a non-2xx status
    Status(StatusCode),
}

/// A failed dispatch outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Failure kind
    pub kind: FailureKind,
    /// Method of the failed request
    pub method: Method,
    /// Path of the failed request
    pub path: String,
    /// Response body, or the transport error text for `NoResponse`
    pub message: String,
}

impl Failure {
    /// Failure for a request that never got a response
    pub fn no_response(request: &RequestDescriptor, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::NoResponse,
            method: request.method.clone(),
            path: request.path.clone(),
            message: message.into(),
        }
    }

    /// Failure for a non-2xx response
    pub fn from_status(
        request: &RequestDescriptor,
        status: StatusCode,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind: FailureKind::Status(status),
            method: request.method.clone(),
            path: request.path.clone(),
            message: body.into(),
        }
    }

    /// Response status, if there was a response
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self.kind {
            FailureKind::Status(status) => Some(status),
            FailureKind::NoResponse => None,
        }
    }

    /// Whether the server reported a missing or expired session
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.kind == FailureKind::Status(StatusCode::UNAUTHORIZED)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::NoResponse => {
                write!(
                    f,
                    "{} {} failed without a response: {}",
                    self.method, self.path, self.message
                )
            }
            FailureKind::Status(status) if self.message.is_empty() => {
                write!(f, "{} {} returned HTTP {status}", self.method, self.path)
            }
            FailureKind::Status(status) => write!(
                f,
                "{} {} returned HTTP {status}: {}",
                self.method, self.path, self.message
            ),
        }
    }
}

impl std::error::Error for Failure {}
