//! Error types for the preview session facade

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PreviewError>;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("browser executable does not exist: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("start URL is not a valid URL: {0}")]
    InvalidStartUrl(#[source] url::ParseError),

    #[error(transparent)]
    Browser(#[from] browser::BrowserError),

    #[error(transparent)]
    Proxy(#[from] proxy::ProxyError),
}
