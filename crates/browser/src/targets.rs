//! Target Discovery and Inspector URL Resolution
//!
//! Maps a logical page URL to its live debugging session. Target URLs can
//! carry a trailing slash or tracking parameters while still denoting the
//! same page, so both sides are normalized before comparison. The inspector
//! URL is reconstructed from the raw debugger id instead of trusting the
//! frontend URL embedded in the target record, which may omit the `ws=`
//! session parameter.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::retry::RetryPolicy;

/// One inspectable context reported by `GET /json`.
///
/// Everything beyond `type` and `url` is optional - real listings contain
/// half-populated records and those must be skipped, not crashed on.
#[derive(Debug, Clone, Deserialize)]
pub struct DebugTarget {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
    #[serde(rename = "devtoolsFrontendUrl")]
    pub devtools_frontend_url: Option<String>,
}

impl DebugTarget {
    pub fn is_page(&self) -> bool {
        self.kind == "page"
    }

    /// Blank tabs, the new-tab page and devtools-internal pages are never
    /// what the caller asked to inspect.
    pub fn is_placeholder(&self) -> bool {
        self.url == "about:blank"
            || self.url == "chrome://new-tab-page/"
            || self.url.starts_with("devtools://")
    }
}

/// Canonical form for URL equivalence: strip one trailing slash from a
/// non-root path, drop query and fragment. Unparseable input is returned
/// verbatim so it can only ever match itself.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };
    if parsed.cannot_be_a_base() {
        return raw.to_string();
    }

    let path = parsed.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path[..path.len() - 1].to_string();
        parsed.set_path(&trimmed);
    }
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

/// Selection policy: exact normalized-URL match first, then the first page
/// target that is not a placeholder.
fn select_target<'a>(targets: &'a [DebugTarget], normalized_wanted: &str) -> Option<&'a DebugTarget> {
    targets
        .iter()
        .find(|t| t.is_page() && !t.url.is_empty() && normalize_url(&t.url) == normalized_wanted)
        .or_else(|| targets.iter().find(|t| t.is_page() && !t.url.is_empty() && !t.is_placeholder()))
}

/// The opaque segment after the last `/page/` in a WebSocket debugger URL.
fn debugger_id(ws_url: &str) -> Option<&str> {
    let idx = ws_url.rfind("/page/")?;
    let id = &ws_url[idx + "/page/".len()..];
    (!id.is_empty() && !id.contains('/')).then_some(id)
}

/// Rebuild the inspector frontend URL from the raw debugger id, so the
/// `ws=` parameter always points at the right session.
pub fn inspector_url_from_ws(port: u16, ws_url: &str) -> Option<String> {
    let id = debugger_id(ws_url)?;
    Some(format!(
        "http://localhost:{port}/devtools/inspector.html?ws=localhost:{port}/devtools/page/{id}"
    ))
}

pub struct TargetResolver {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl TargetResolver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }

    /// Poll the target listing on `port` until a target matching
    /// `logical_url` (or any real page, as a fallback) appears, then return
    /// its inspector frontend URL. Connection errors and malformed listings
    /// count as failed attempts; exhaustion is a normal `None`.
    pub async fn resolve_inspector_url(
        &self,
        port: u16,
        logical_url: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let wanted = normalize_url(logical_url);
        let listing_url = format!("http://localhost:{port}/json");

        let resolved = self
            .policy
            .run(cancel, || {
                let client = self.client.clone();
                let listing_url = listing_url.clone();
                let wanted = wanted.clone();
                async move {
                    let response = match client.get(&listing_url).send().await {
                        Ok(response) => response,
                        Err(e) => {
                            tracing::debug!("target listing not reachable: {e}");
                            return None;
                        }
                    };

                    let targets: Vec<DebugTarget> = match response.json().await {
                        Ok(targets) => targets,
                        Err(e) => {
                            tracing::debug!("target listing not parseable: {e}");
                            return None;
                        }
                    };

                    tracing::debug!("{} debug targets listed", targets.len());
                    let target = select_target(&targets, &wanted)?;
                    inspector_url_for(port, target)
                }
            })
            .await;

        match &resolved {
            Some(url) => tracing::info!("resolved inspector URL: {url}"),
            None => tracing::warn!(
                "no inspectable target for {logical_url} on port {port} after {} attempts",
                self.policy.attempts
            ),
        }

        resolved
    }
}

fn inspector_url_for(port: u16, target: &DebugTarget) -> Option<String> {
    if let Some(ws_url) = target.web_socket_debugger_url.as_deref() {
        if let Some(url) = inspector_url_from_ws(port, ws_url) {
            return Some(url);
        }
        tracing::warn!("unexpected WebSocket debugger URL shape: {ws_url}");
    }

    // Best effort: the pre-built frontend URL may lack the ws= session
    // parameter, in which case the inspector will not attach.
    let frontend = target.devtools_frontend_url.clone()?;
    if !frontend.contains("ws=") {
        tracing::warn!("frontend URL has no ws= parameter, inspector may not attach: {frontend}");
    }
    Some(frontend)
}
