//! Error types for the reverse proxy
//!
//! Fatal only at startup: a port that cannot be bound. Per-request
//! failures (bad URLs, dead upstreams) are converted to HTTP responses
//! inside the handler and never surface here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind proxy listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to build upstream HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
