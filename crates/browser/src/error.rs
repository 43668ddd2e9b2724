//! Error types for browser process management
//!
//! Only spawn-time failures are errors. A debug endpoint or target that
//! never shows up is a normal negative outcome (`Ok(None)`), not an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to spawn browser process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to create user data directory: {0}")]
    UserDataDir(#[source] std::io::Error),
}
