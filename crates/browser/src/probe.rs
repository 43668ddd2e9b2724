//! Debug Endpoint Probing
//!
//! After a browser spawn, the remote-debugging HTTP endpoint takes a
//! moment to come up. Poll `/json/version` until it publishes a usable
//! `webSocketDebuggerUrl`. Connection errors, non-JSON bodies and missing
//! fields all count as failed attempts against the retry budget.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::retry::RetryPolicy;

/// Payload of `GET /json/version`. Only the field we act on.
#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: Option<String>,
}

pub struct EndpointProber {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl EndpointProber {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }

    /// Wait for the browser on `port` to publish its WebSocket debugger
    /// URL. Resolves `None` when the retry budget is exhausted or the
    /// token fires - callers treat that as a normal negative outcome.
    pub async fn wait_for_debug_endpoint(
        &self,
        port: u16,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let version_url = format!("http://localhost:{port}/json/version");

        let found = self
            .policy
            .run(cancel, || {
                let client = self.client.clone();
                let version_url = version_url.clone();
                async move {
                    let response = match client.get(&version_url).send().await {
                        Ok(response) => response,
                        Err(e) => {
                            tracing::debug!("debug endpoint not reachable yet: {e}");
                            return None;
                        }
                    };

                    let info: VersionInfo = match response.json().await {
                        Ok(info) => info,
                        Err(e) => {
                            tracing::debug!("version payload not parseable yet: {e}");
                            return None;
                        }
                    };

                    match info.web_socket_debugger_url {
                        Some(ws_url) if !ws_url.is_empty() => Some(ws_url),
                        _ => None,
                    }
                }
            })
            .await;

        match &found {
            Some(ws_url) => tracing::info!("browser remote debugging ready: {ws_url}"),
            None => tracing::warn!("no webSocketDebuggerUrl on port {port} after {} attempts", self.policy.attempts),
        }

        found
    }
}
