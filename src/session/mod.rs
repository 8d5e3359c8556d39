//! Session state owned by the client
//!
//! - Cookie session storage, persisted across restarts
//! - Navigation surface used when a session ends
//! - The terminal action run when a session cannot be renewed

mod navigator;
mod store;
mod terminator;

pub use navigator::{LocationTracker, Navigator};
pub use store::SessionStore;
pub use terminator::{LocalSessionTerminator, SessionTerminator};
