//! Preview Session
//!
//! One `PreviewSession` per logical preview: it owns the browser
//! supervisor and the content proxy, so relaunches never share hidden
//! state. The consuming UI layer calls `dispose_process`/`stop_proxy` on
//! teardown and owns all user-facing error presentation.

use browser::{ChromeSupervisor, ProcessState, RetryPolicy, SupervisorConfig, TargetResolver};
use proxy::{ProxyConfig, ReverseProxy};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};

pub struct PreviewSession {
    config: PreviewConfig,
    supervisor: ChromeSupervisor,
    proxy: ReverseProxy,
    resolver: TargetResolver,
    /// Token for the in-flight inspector resolution, superseded by each
    /// newer resolve and cancelled on dispose.
    resolve_guard: RwLock<CancellationToken>,
}

impl PreviewSession {
    pub fn new(config: PreviewConfig) -> Result<Self> {
        let default_target = Url::parse(&config.start_url).map_err(PreviewError::InvalidStartUrl)?;

        let mut supervisor_config = SupervisorConfig::new(config.executable.clone());
        supervisor_config.debug_port = config.debug_port;
        supervisor_config.user_data_dir = config.user_data_dir.clone();

        Ok(Self {
            supervisor: ChromeSupervisor::new(supervisor_config),
            proxy: ReverseProxy::new(ProxyConfig::new(config.proxy_port, default_target)),
            resolver: TargetResolver::new(RetryPolicy::target_listing()),
            resolve_guard: RwLock::new(CancellationToken::new()),
            config,
        })
    }

    /// Launch (or relaunch) the managed browser at `url` and wait for its
    /// debug endpoint. `Ok(None)` means the endpoint never came up; the
    /// caller owns the user-facing message.
    pub async fn launch(&self, url: &str) -> Result<Option<String>> {
        if !self.config.executable.exists() {
            return Err(PreviewError::ExecutableNotFound(self.config.executable.clone()));
        }
        Ok(self.supervisor.launch(url).await?)
    }

    pub fn debug_port(&self) -> u16 {
        self.config.debug_port
    }

    pub fn proxy_port(&self) -> u16 {
        self.config.proxy_port
    }

    /// The URL a preview panel should embed: the proxied origin, not the
    /// dev server itself.
    pub fn preview_url(&self) -> String {
        format!("http://localhost:{}/", self.config.proxy_port)
    }

    pub async fn process_state(&self) -> ProcessState {
        self.supervisor.state().await
    }

    /// Idempotent; a call while the proxy is already listening succeeds
    /// without a second bind.
    pub async fn start_proxy(&self) -> Result<()> {
        Ok(self.proxy.start().await?)
    }

    pub async fn stop_proxy(&self) {
        self.proxy.stop().await;
    }

    /// Map `logical_url` to a live inspector frontend URL. A newer call
    /// supersedes any in-flight resolution for this session.
    pub async fn resolve_inspector_url(&self, logical_url: &str) -> Option<String> {
        let token = {
            let mut guard = self.resolve_guard.write().await;
            guard.cancel();
            *guard = CancellationToken::new();
            guard.clone()
        };
        self.resolver
            .resolve_inspector_url(self.config.debug_port, logical_url, &token)
            .await
    }

    /// Kill the managed browser and cancel any in-flight resolution.
    pub async fn dispose_process(&self) {
        tracing::info!("disposing managed browser process");
        self.resolve_guard.read().await.cancel();
        self.supervisor.stop().await;
    }

    /// Full teardown: process and proxy.
    pub async fn dispose(&self) {
        self.dispose_process().await;
        self.stop_proxy().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session_with_missing_executable() -> PreviewSession {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PreviewConfig::new(dir.path().join("no-such-browser"));
        config.user_data_dir = dir.path().join("profile");
        PreviewSession::new(config).unwrap()
    }

    #[test]
    fn invalid_start_url_is_rejected_at_construction() {
        let mut config = PreviewConfig::new("/usr/bin/google-chrome");
        config.start_url = "not a url".to_string();
        assert!(matches!(
            PreviewSession::new(config),
            Err(PreviewError::InvalidStartUrl(_))
        ));
    }

    #[test]
    fn preview_url_points_at_the_proxy() {
        let session = session_with_missing_executable();
        assert_eq!(session.preview_url(), "http://localhost:9000/");
        assert_eq!(session.proxy_port(), 9000);
        assert_eq!(session.debug_port(), 9222);
    }

    #[tokio::test]
    async fn launch_requires_an_existing_executable() {
        let session = session_with_missing_executable();
        assert!(matches!(
            session.launch("http://localhost:5173/").await,
            Err(PreviewError::ExecutableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn dispose_cancels_an_in_flight_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PreviewConfig::new(dir.path().join("no-such-browser"));
        config.user_data_dir = dir.path().join("profile");
        // Port 1 never serves the target listing, so without cancellation
        // this resolution would run its full ~20s budget.
        config.debug_port = 1;
        let session = std::sync::Arc::new(PreviewSession::new(config).unwrap());

        let resolving = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .resolve_inspector_url("http://localhost:5173/")
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        session.dispose_process().await;

        let resolved = tokio::time::timeout(Duration::from_secs(2), resolving)
            .await
            .expect("resolution must end promptly after dispose")
            .unwrap();
        assert!(resolved.is_none());
    }
}
