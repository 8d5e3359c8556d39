//! Session cookie storage
//!
//! Persists the API session cookies to disk so a restarted client keeps its
//! session. The cookie session is the only credential the client holds: the
//! refresh endpoint renews it through `Set-Cookie`, and nothing else is
//! stored.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// On-disk layout of the session file
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    cookies: BTreeMap<String, String>,
}

/// Session cookie jar, optionally backed by a file
pub struct SessionStore {
    /// Backing file (`None` = memory only)
    path: Option<PathBuf>,
    cookies: RwLock<BTreeMap<String, String>>,
}

impl SessionStore {
    /// Open the store at `path`, loading any cookies saved there
    ///
    /// A missing file is an empty session. A file that cannot be parsed is
    /// logged and treated as empty as well.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Internal(format!("Failed to create session storage dir: {e}"))
                })?;
            }
        }

        let cookies = load_cookies(&path);
        Ok(Self {
            path: Some(path),
            cookies: RwLock::new(cookies),
        })
    }

    /// Create a store that never touches the filesystem
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cookies: RwLock::new(BTreeMap::new()),
        }
    }

    /// Default session file location (`~/.dealwatch/session.json`)
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Internal("Cannot determine home directory".to_string()))?;

        Ok(home.join(".dealwatch").join("session.json"))
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Value of the `Cookie` request header, or `None` without a session
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookies.read();
        if cookies.is_empty() {
            return None;
        }

        Some(
            cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Apply one `Set-Cookie` response header
    ///
    /// An empty value, a non-positive `Max-Age` or an `Expires` date in the
    /// past removes the cookie.
    pub fn absorb_set_cookie(&self, header: &str) {
        let Some(update) = parse_set_cookie(header) else {
            debug!(header, "Ignoring malformed Set-Cookie header");
            return;
        };

        let mut cookies = self.cookies.write();
        let changed = match update {
            CookieUpdate::Set(name, value) => {
                cookies.insert(name, value.clone()).as_ref() != Some(&value)
            }
            CookieUpdate::Remove(name) => cookies.remove(&name).is_some(),
        };

        if changed {
            self.persist(&cookies);
        }
    }

    /// Set a cookie directly
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut cookies = self.cookies.write();
        cookies.insert(name.into(), value.into());
        self.persist(&cookies);
    }

    /// Names of the stored cookies
    #[must_use]
    pub fn cookie_names(&self) -> Vec<String> {
        self.cookies.read().keys().cloned().collect()
    }

    /// Whether no session cookies are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }

    /// Drop every cookie, in memory and on disk
    pub fn clear(&self) -> Result<()> {
        // Held through the delete so no concurrent write can restore the file
        let mut cookies = self.cookies.write();
        cookies.clear();

        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => info!(path = %path.display(), "Deleted session file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Internal(format!("Failed to delete session file: {e}")));
                }
            }
        }

        Ok(())
    }

    /// Write `cookies` to disk (no-op for in-memory stores)
    ///
    /// Callers hold the write lock across the call, so file writes happen in
    /// the same order as the changes they record.
    fn persist(&self, cookies: &BTreeMap<String, String>) {
        let Some(path) = &self.path else {
            return;
        };

        if let Err(e) = write_session_file(path, cookies) {
            warn!(path = %path.display(), error = %e, "Failed to persist session");
        }
    }
}

fn load_cookies(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        debug!(path = %path.display(), "No stored session found");
        return BTreeMap::new();
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<SessionFile>(&content) {
            Ok(file) => {
                info!(cookies = file.cookies.len(), "Loaded stored session");
                file.cookies
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse stored session");
                BTreeMap::new()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read session file");
            BTreeMap::new()
        }
    }
}

fn write_session_file(path: &Path, cookies: &BTreeMap<String, String>) -> Result<()> {
    let file = SessionFile {
        cookies: cookies.clone(),
    };
    let content = serde_json::to_string_pretty(&file)?;
    fs::write(path, content)?;

    // Owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        let _ = fs::set_permissions(path, perms);
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum CookieUpdate {
    Set(String, String),
    Remove(String),
}

fn parse_set_cookie(header: &str) -> Option<CookieUpdate> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;

    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"');

    let mut max_age = None;
    let mut expires = None;
    for attr in parts {
        let Some((key, val)) = attr.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("max-age") {
            max_age = val.trim().parse::<i64>().ok();
        } else if key.eq_ignore_ascii_case("expires") {
            expires = parse_cookie_date(val.trim());
        }
    }

    // Max-Age wins over Expires when both are present
    let expired = match max_age {
        Some(secs) => secs <= 0,
        None => expires.is_some_and(|at| at <= Utc::now()),
    };

    if value.is_empty() || expired {
        Some(CookieUpdate::Remove(name.to_string()))
    } else {
        Some(CookieUpdate::Set(name.to_string(), value.to_string()))
    }
}

/// Parse an `Expires` value (`Thu, 01 Jan 1970 00:00:00 GMT`, dashes allowed
/// between the date fields)
fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.replace('-', " ");
    DateTime::parse_from_rfc2822(&normalized)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
