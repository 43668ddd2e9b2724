//! Browser Process Lifecycle
//!
//! At most one managed browser process per supervisor. A relaunch kills
//! the existing child and reaps it before the new spawn, so the debug port
//! and profile directory never collide. A monitor task owns the child and
//! selects on exit vs. an explicit kill signal - no polling.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{BrowserError, Result};
use crate::probe::EndpointProber;
use crate::retry::RetryPolicy;

/// Lifecycle of the managed browser process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Idle,
    Starting,
    Running,
    Exited,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub executable: PathBuf,
    pub debug_port: u16,
    pub user_data_dir: PathBuf,
    pub probe_policy: RetryPolicy,
}

impl SupervisorConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            debug_port: 9222,
            user_data_dir: std::env::temp_dir().join("browser-debug-profile"),
            probe_policy: RetryPolicy::debug_endpoint(),
        }
    }
}

/// The fixed launch flag profile: remote debugging on `port`, isolated
/// profile, no first-run UI, relaxed local TLS, cross-origin debugging
/// allowed, headless, then the start URL as the final argument.
pub(crate) fn launch_args(port: u16, user_data_dir: &Path, target_url: &str) -> Vec<String> {
    vec![
        format!("--remote-debugging-port={port}"),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--allow-insecure-localhost".to_string(),
        "--remote-allow-origins=*".to_string(),
        "--headless=new".to_string(),
        target_url.to_string(),
    ]
}

/// Handle to a spawned child held behind the supervisor lock. The monitor
/// task owns the `Child`; killing goes through the oneshot so exit and
/// kill never race over the same handle.
struct ManagedProcess {
    pid: Option<u32>,
    kill_tx: oneshot::Sender<()>,
    monitor: tokio::task::JoinHandle<()>,
    probe_cancel: CancellationToken,
}

pub struct ChromeSupervisor {
    config: SupervisorConfig,
    prober: EndpointProber,
    current: Arc<RwLock<Option<ManagedProcess>>>,
    state: Arc<RwLock<ProcessState>>,
}

impl ChromeSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let prober = EndpointProber::new(config.probe_policy);
        Self {
            config,
            prober,
            current: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(ProcessState::Idle)),
        }
    }

    pub fn debug_port(&self) -> u16 {
        self.config.debug_port
    }

    pub async fn state(&self) -> ProcessState {
        *self.state.read().await
    }

    pub async fn pid(&self) -> Option<u32> {
        self.current.read().await.as_ref().and_then(|p| p.pid)
    }

    /// Launch the browser at `target_url` and wait for its debug endpoint.
    ///
    /// Any existing managed process is killed and reaped first. Returns
    /// `Ok(Some(ws_url))` once the endpoint is up, `Ok(None)` when probing
    /// exhausts its budget, `Err` when the spawn itself fails.
    pub async fn launch(&self, target_url: &str) -> Result<Option<String>> {
        self.stop().await;
        *self.state.write().await = ProcessState::Starting;

        tokio::fs::create_dir_all(&self.config.user_data_dir)
            .await
            .map_err(BrowserError::UserDataDir)?;

        let args = launch_args(self.config.debug_port, &self.config.user_data_dir, target_url);
        tracing::info!(
            "launching {} {}",
            self.config.executable.display(),
            args.join(" ")
        );

        let mut child = Command::new(&self.config.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("browser spawn failed: {e}");
                BrowserError::Spawn(e)
            })?;

        let pid = child.id();
        stream_diagnostics(&mut child);

        let (kill_tx, kill_rx) = oneshot::channel();
        let probe_cancel = CancellationToken::new();

        // Hold the handle lock across monitor spawn and store: an instantly
        // exiting child must not have its cleanup run before the handle is
        // in place.
        {
            let mut guard = self.current.write().await;
            let monitor = spawn_monitor(
                child,
                kill_rx,
                probe_cancel.clone(),
                self.current.clone(),
                self.state.clone(),
            );
            *guard = Some(ManagedProcess {
                pid,
                kill_tx,
                monitor,
                probe_cancel: probe_cancel.clone(),
            });
            *self.state.write().await = ProcessState::Running;
        }

        let ws_url = self
            .prober
            .wait_for_debug_endpoint(self.config.debug_port, &probe_cancel)
            .await;
        Ok(ws_url)
    }

    /// Force-kill the managed process and reap it before returning.
    /// Idempotent; also cancels any in-flight probe for that process.
    pub async fn stop(&self) {
        let existing = self.current.write().await.take();
        if let Some(process) = existing {
            tracing::info!(pid = process.pid, "killing existing browser process");
            process.probe_cancel.cancel();
            let _ = process.kill_tx.send(());
            let _ = process.monitor.await;
            *self.state.write().await = ProcessState::Exited;
        }
    }
}

/// Re-emit child stdout/stderr lines on the tracing pipeline.
/// Fire-and-forget: the reader tasks die with the pipes.
fn stream_diagnostics(child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!(stream = "stdout", "browser: {line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(stream = "stderr", "browser: {line}");
            }
        });
    }
}

fn spawn_monitor(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    probe_cancel: CancellationToken,
    current: Arc<RwLock<Option<ManagedProcess>>>,
    state: Arc<RwLock<ProcessState>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => {
                // Unexpected exit: surface it, clear the handle, no restart.
                let next = match status {
                    Ok(status) if status.success() => {
                        tracing::info!("browser process exited cleanly");
                        ProcessState::Exited
                    }
                    Ok(status) => {
                        tracing::warn!("browser process exited: {status}");
                        ProcessState::Failed
                    }
                    Err(e) => {
                        tracing::error!("failed waiting on browser process: {e}");
                        ProcessState::Failed
                    }
                };
                probe_cancel.cancel();
                current.write().await.take();
                *state.write().await = next;
            }
            _ = kill_rx => {
                if let Err(e) = child.start_kill() {
                    tracing::warn!("failed to kill browser process: {e}");
                }
                let _ = child.wait().await;
            }
        }
    })
}
