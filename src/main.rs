//! Dealwatch - command-line client for the game-deal tracking API

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use reqwest::Method;
use tracing::{debug, error};

use dealwatch_client::{
    ApiClient, RequestDescriptor,
    cli::{Cli, Command},
    config::Config,
    notify::{DedupNotifier, LogNotifier},
    session::{LocalSessionTerminator, LocationTracker, Navigator, SessionStore, SessionTerminator},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = match config
        .session
        .resolve_store_path()
        .and_then(SessionStore::open)
    {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "Failed to open session store");
            return ExitCode::FAILURE;
        }
    };

    // The CLI has no pages; it starts "somewhere inside the app"
    let navigator = Arc::new(LocationTracker::new("/"));

    match cli.command {
        Command::Request { method, path, data } => {
            run_request(&config, store, navigator, &method, &path, data.as_deref()).await
        }
        Command::Session => show_session(&store),
        Command::Logout => {
            LocalSessionTerminator::new(store, navigator, config.session.entry_path.clone())
                .terminate();
            println!("Logged out");
            ExitCode::SUCCESS
        }
    }
}

/// Send one request and print the response
async fn run_request(
    config: &Config,
    store: Arc<SessionStore>,
    navigator: Arc<LocationTracker>,
    method: &str,
    path: &str,
    data: Option<&str>,
) -> ExitCode {
    let method = match Method::from_bytes(method.to_ascii_uppercase().as_bytes()) {
        Ok(method) => method,
        Err(e) => {
            eprintln!("❌ Invalid method {method}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let notifier = Arc::new(DedupNotifier::new(
        LogNotifier,
        config.notifications.dedup_window,
    ));

    let client = match ApiClient::with_store(config, store, navigator.clone(), notifier) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build API client");
            return ExitCode::FAILURE;
        }
    };

    let mut request = RequestDescriptor::new(method, path);
    if let Some(data) = data {
        let body: serde_json::Value = match serde_json::from_str(data) {
            Ok(body) => body,
            Err(e) => {
                eprintln!("❌ --data is not valid JSON: {e}");
                return ExitCode::FAILURE;
            }
        };
        request = match request.json(&body) {
            Ok(request) => request,
            Err(e) => {
                eprintln!("❌ Failed to encode body: {e}");
                return ExitCode::FAILURE;
            }
        };
    }

    match client.send(request).await {
        Ok(response) => {
            println!("{}", response.status);
            match response.json::<serde_json::Value>() {
                Ok(json) => println!(
                    "{}",
                    serde_json::to_string_pretty(&json).unwrap_or_else(|_| response.text())
                ),
                Err(_) => println!("{}", response.text()),
            }
            ExitCode::SUCCESS
        }
        Err(failure) => {
            eprintln!("❌ {failure}");
            if navigator.current_location() != "/" {
                debug!(location = %navigator.current_location(), "Session ended");
                eprintln!("   Session ended; log in again at {}", navigator.current_location());
            }
            ExitCode::FAILURE
        }
    }
}

/// Print the stored session cookie names
fn show_session(store: &SessionStore) -> ExitCode {
    if let Some(path) = store.path() {
        println!("Session file: {}", path.display());
    }

    if store.is_empty() {
        println!("No active session");
    } else {
        println!("Cookies: {}", store.cookie_names().join(", "));
    }

    ExitCode::SUCCESS
}
