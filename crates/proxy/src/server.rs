//! Reverse Proxy Server
//!
//! A single long-lived listener shared by the whole preview session.
//! `start` is idempotent: while the server is live it is a successful
//! no-op, and it is safe to call while a previous instance is mid-teardown
//! (the live-listening check happens first). Per-request failures become
//! 4xx/5xx responses; the server itself never dies from a bad upstream.

use axum::body::Body;
use axum::extract::{FromRequestParts, Request, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cors::{apply_cors, preflight_response};
use crate::error::{ProxyError, Result};
use crate::route::{classify, ProxyRoute};
use crate::tunnel;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_port: u16,
    pub default_target: Url,
}

impl ProxyConfig {
    pub fn new(listen_port: u16, default_target: Url) -> Self {
        Self {
            listen_port,
            default_target,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_port: 9000,
            default_target: Url::parse("http://localhost:5173/").expect("static URL"),
        }
    }
}

/// Shared state for the request handler.
struct ProxyContext {
    client: reqwest::Client,
    default_target: Url,
}

struct Listening {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

pub struct ReverseProxy {
    config: ProxyConfig,
    listening: Arc<RwLock<Option<Listening>>>,
}

impl ReverseProxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            listening: Arc::new(RwLock::new(None)),
        }
    }

    pub fn port(&self) -> u16 {
        self.config.listen_port
    }

    /// The address actually bound, once listening. Tests bind port 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.read().await.as_ref().map(|l| l.addr)
    }

    /// Bind and serve. A second `start` while listening is a no-op success.
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.listening.write().await;
        if let Some(listening) = guard.as_ref() {
            if !listening.task.is_finished() {
                tracing::info!("reverse proxy already listening on {}", listening.addr);
                return Ok(());
            }
        }

        // Upstream TLS is not verified: local dev servers run self-signed.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(ProxyError::Client)?;
        let context = Arc::new(ProxyContext {
            client,
            default_target: self.config.default_target.clone(),
        });
        let app = Router::new()
            .fallback(handle_request)
            .with_state(context);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", self.config.listen_port))
            .await
            .map_err(ProxyError::Bind)?;
        let addr = listener.local_addr().map_err(ProxyError::Bind)?;

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await });
            if let Err(e) = serve.await {
                tracing::error!("reverse proxy server error: {e}");
            }
        });

        tracing::info!("reverse proxy listening on http://{addr}");
        *guard = Some(Listening {
            addr,
            shutdown,
            task,
        });
        Ok(())
    }

    /// Shut the listener down and wait for it. Idempotent.
    pub async fn stop(&self) {
        let existing = self.listening.write().await.take();
        if let Some(listening) = existing {
            listening.shutdown.cancel();
            let _ = listening.task.await;
            tracing::info!("reverse proxy closed");
        }
    }
}

async fn handle_request(State(context): State<Arc<ProxyContext>>, request: Request) -> Response {
    // Preflights never reach the upstream.
    if request.method() == Method::OPTIONS {
        return preflight_response();
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let route = match classify(host.as_deref(), request.uri(), &context.default_target) {
        Ok(route) => route,
        Err(e) => {
            tracing::warn!("rejecting request {}: {e}", request.uri());
            return (StatusCode::BAD_REQUEST, format!("Invalid URL: {e}")).into_response();
        }
    };
    tracing::debug!(
        external = route.external,
        "proxying {} {} -> {}",
        request.method(),
        request.uri(),
        route.upstream
    );

    if is_websocket_upgrade(request.headers()) {
        return upgrade_and_tunnel(route, request).await;
    }

    match forward_http(&context.client, route, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("upstream proxy error: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Proxy error: {e}")).into_response()
        }
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

async fn upgrade_and_tunnel(route: ProxyRoute, request: Request) -> Response {
    let Some(upstream_url) = tunnel::websocket_url(route.upstream) else {
        return (StatusCode::BAD_REQUEST, "Invalid upgrade target").into_response();
    };

    let (mut parts, _body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade
            .on_upgrade(move |client| async move { tunnel::run(client, &upstream_url).await })
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn forward_http(
    client: &reqwest::Client,
    route: ProxyRoute,
    request: Request,
) -> std::result::Result<Response, reqwest::Error> {
    let (parts, body) = request.into_parts();

    let mut headers = parts.headers;
    // The upstream host comes from the routed URL.
    headers.remove(header::HOST);

    let upstream = client
        .request(parts.method, route.upstream.as_str())
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    // Framing is re-negotiated on our side of the connection.
    response_headers.remove(header::TRANSFER_ENCODING);
    response_headers.remove(header::CONNECTION);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    apply_cors(response.headers_mut());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::WebSocket;
    use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
    use axum::routing::get;
    use futures_util::{SinkExt, StreamExt};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn serve_upstream(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn start_proxy(default_target: Url) -> (ReverseProxy, SocketAddr) {
        let proxy = ReverseProxy::new(ProxyConfig::new(0, default_target));
        proxy.start().await.unwrap();
        let addr = proxy.local_addr().await.unwrap();
        (proxy, addr)
    }

    fn echo_app(hits: Arc<AtomicU32>) -> Router {
        Router::new().fallback(move |request: Request| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                format!("{} {}", request.method(), request.uri())
            }
        })
    }

    #[tokio::test]
    async fn internal_request_preserves_path_and_query() {
        let hits = Arc::new(AtomicU32::new(0));
        let upstream = serve_upstream(echo_app(hits.clone())).await;
        let target = Url::parse(&format!("http://{upstream}/")).unwrap();
        let (proxy, addr) = start_proxy(target).await;

        let response = reqwest::get(format!("http://{addr}/a/b?x=1&y=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        assert_eq!(response.text().await.unwrap(), "GET /a/b?x=1&y=2");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        proxy.stop().await;
    }

    #[tokio::test]
    async fn options_is_answered_locally_with_cors() {
        let hits = Arc::new(AtomicU32::new(0));
        let upstream = serve_upstream(echo_app(hits.clone())).await;
        let target = Url::parse(&format!("http://{upstream}/")).unwrap();
        let (proxy, addr) = start_proxy(target).await;

        let client = reqwest::Client::new();
        let response = client
            .request(Method::OPTIONS, format!("http://{addr}/anything"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "GET, POST, PUT, DELETE, OPTIONS, PATCH"
        );
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            "Content-Type, Authorization, X-Requested-With, Accept, Origin"
        );
        assert_eq!(headers.get("access-control-allow-credentials").unwrap(), "true");
        assert_eq!(headers.get("access-control-max-age").unwrap(), "86400");
        assert_eq!(hits.load(Ordering::SeqCst), 0, "preflight must not reach upstream");

        proxy.stop().await;
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let (proxy, addr) = start_proxy(ProxyConfig::default().default_target).await;

        proxy.start().await.unwrap();
        assert_eq!(proxy.local_addr().await, Some(addr));

        proxy.stop().await;
        proxy.stop().await; // idempotent
    }

    #[tokio::test]
    async fn dead_upstream_becomes_500_not_a_crash() {
        // Port 1 refuses connections.
        let target = Url::parse("http://127.0.0.1:1/").unwrap();
        let (proxy, addr) = start_proxy(target).await;

        let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.text().await.unwrap().starts_with("Proxy error:"));

        // Server is still alive afterwards.
        let response = reqwest::get(format!("http://{addr}/again")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        proxy.stop().await;
    }

    #[tokio::test]
    async fn malformed_host_is_rejected_with_400() {
        let (proxy, addr) = start_proxy(ProxyConfig::default().default_target).await;

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: bad:host:::\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 400"), "got: {response}");

        proxy.stop().await;
    }

    async fn ws_echo(upgrade: WebSocketUpgrade) -> Response {
        upgrade.on_upgrade(|mut socket: WebSocket| async move {
            while let Some(Ok(message)) = socket.recv().await {
                if socket.send(message).await.is_err() {
                    break;
                }
            }
        })
    }

    #[tokio::test]
    async fn websocket_upgrade_is_tunnelled() {
        let upstream_app = Router::new().route("/live", get(ws_echo));
        let upstream = serve_upstream(upstream_app).await;
        let target = Url::parse(&format!("http://{upstream}/")).unwrap();
        let (proxy, addr) = start_proxy(target).await;

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/live"))
            .await
            .unwrap();
        socket
            .send(tokio_tungstenite::tungstenite::Message::Text("ping".to_string()))
            .await
            .unwrap();
        let echoed = socket.next().await.unwrap().unwrap();
        assert_eq!(echoed.into_text().unwrap(), "ping");

        proxy.stop().await;
    }
}
