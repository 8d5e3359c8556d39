//! Dealwatch API client
//!
//! Shared HTTP client for the game-deal tracking service.
//!
//! # Features
//!
//! - **Cookie sessions**: persisted across restarts, attached to every request
//! - **Transparent refresh**: an expired session is renewed once for all
//!   requests in flight, and each affected request is replayed exactly once
//! - **Session termination**: when renewal fails, local credentials are
//!   cleared and the user is sent back to the entry surface
//! - **Permission notices**: deduplicated notifications on HTTP 403

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod notify;
pub mod session;

pub use client::{ApiClient, ApiResponse, Failure, RequestDescriptor};
pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))?,
    }

    Ok(())
}
