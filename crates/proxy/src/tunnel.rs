//! WebSocket Tunnelling
//!
//! Live-reload and debugging transports ride over the same origin as the
//! proxied page, so upgrade requests are tunnelled under the same routing
//! rule as plain HTTP: accept the client socket, dial the upstream, pump
//! frames both ways until either side closes.

use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use url::Url;

/// Derive the upstream WebSocket URL from the routed HTTP upstream.
pub fn websocket_url(mut upstream: Url) -> Option<Url> {
    let scheme = match upstream.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    upstream.set_scheme(scheme).ok()?;
    Some(upstream)
}

/// Dial `upstream_url` and relay frames between it and the accepted
/// client socket. Runs until either side closes or errors.
pub async fn run(client: WebSocket, upstream_url: &Url) {
    let (upstream, _) = match connect_async(upstream_url.as_str()).await {
        Ok(connected) => connected,
        Err(e) => {
            tracing::warn!("websocket upstream {upstream_url} refused: {e}");
            return;
        }
    };
    tracing::debug!("websocket tunnel open to {upstream_url}");

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            if upstream_tx.send(to_upstream(message)).await.is_err() {
                break;
            }
        }
    };

    let upstream_to_client = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            if client_tx.send(message).await.is_err() {
                break;
            }
        }
    };

    // Either direction ending tears the whole tunnel down.
    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
    tracing::debug!("websocket tunnel to {upstream_url} closed");
}

fn to_upstream(message: ClientMessage) -> UpstreamMessage {
    match message {
        ClientMessage::Text(text) => UpstreamMessage::Text(text),
        ClientMessage::Binary(bytes) => UpstreamMessage::Binary(bytes),
        ClientMessage::Ping(bytes) => UpstreamMessage::Ping(bytes),
        ClientMessage::Pong(bytes) => UpstreamMessage::Pong(bytes),
        ClientMessage::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: f.code.into(),
            reason: f.reason,
        })),
    }
}

fn to_client(message: UpstreamMessage) -> Option<ClientMessage> {
    match message {
        UpstreamMessage::Text(text) => Some(ClientMessage::Text(text)),
        UpstreamMessage::Binary(bytes) => Some(ClientMessage::Binary(bytes)),
        UpstreamMessage::Ping(bytes) => Some(ClientMessage::Ping(bytes)),
        UpstreamMessage::Pong(bytes) => Some(ClientMessage::Pong(bytes)),
        UpstreamMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|f| ClientCloseFrame {
            code: f.code.into(),
            reason: f.reason,
        }))),
        // Raw frames never surface from a read loop.
        UpstreamMessage::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_upstream_becomes_ws() {
        let upstream = Url::parse("http://localhost:5173/ws?token=1").unwrap();
        assert_eq!(
            websocket_url(upstream).unwrap().as_str(),
            "ws://localhost:5173/ws?token=1"
        );
    }

    #[test]
    fn https_upstream_becomes_wss() {
        let upstream = Url::parse("https://example.com/socket").unwrap();
        assert_eq!(
            websocket_url(upstream).unwrap().as_str(),
            "wss://example.com/socket"
        );
    }
}
