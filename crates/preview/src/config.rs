//! Session configuration
//!
//! Owned by the consuming UI layer and only read here. Ports are fixed by
//! design; only the executable path and start URL vary per installation.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Browser executable to launch. Must exist on disk at launch time.
    pub executable: PathBuf,
    /// URL the browser navigates to on start.
    pub start_url: String,
    /// Remote-debugging port the browser is told to publish.
    pub debug_port: u16,
    /// Port the content reverse proxy listens on.
    pub proxy_port: u16,
    /// Root directory for the isolated browser profile.
    pub user_data_dir: PathBuf,
}

impl PreviewConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            start_url: "http://localhost:5173/".to_string(),
            debug_port: 9222,
            proxy_port: 9000,
            user_data_dir: std::env::temp_dir().join("browser-preview-profile"),
        }
    }
}
