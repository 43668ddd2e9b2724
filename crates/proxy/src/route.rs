//! Per-Request Routing
//!
//! The routing decision is pure: given the Host header, the request target
//! and the configured default, produce the upstream URL. Requests addressed
//! to loopback go to the configured target; anything else is the embedded
//! page fetching a third-party origin through us, which we pass through to
//! that origin with path and query untouched.

use axum::http::Uri;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("request has no Host header")]
    MissingHost,

    #[error("malformed request URL: {0}")]
    MalformedUrl(String),
}

/// Where a single request is forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    pub upstream: Url,
    pub external: bool,
}

fn is_loopback_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1"
}

/// Classify one request. `host` is the Host header, `uri` the request
/// target (origin-form or absolute-form), `default_target` the configured
/// base the preview serves from.
pub fn classify(host: Option<&str>, uri: &Uri, default_target: &Url) -> Result<ProxyRoute, RouteError> {
    let effective = if uri.scheme().is_some() {
        // Absolute-form request target carries its own origin.
        Url::parse(&uri.to_string()).map_err(|e| RouteError::MalformedUrl(e.to_string()))?
    } else {
        let host = host.ok_or(RouteError::MissingHost)?;
        Url::parse(&format!("http://{host}{uri}"))
            .map_err(|e| RouteError::MalformedUrl(e.to_string()))?
    };

    let external = !effective
        .host_str()
        .map(is_loopback_host)
        .unwrap_or(false);

    if external {
        // Forward to the request's own origin, path and query unchanged.
        Ok(ProxyRoute {
            upstream: effective,
            external: true,
        })
    } else {
        let mut upstream = default_target.clone();
        upstream.set_path(effective.path());
        upstream.set_query(effective.query());
        Ok(ProxyRoute {
            upstream,
            external: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_target() -> Url {
        Url::parse("http://localhost:5173/").unwrap()
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn loopback_host_routes_to_default_target() {
        let route = classify(Some("localhost:9000"), &uri("/app/main.js?v=2"), &default_target()).unwrap();
        assert!(!route.external);
        assert_eq!(route.upstream.as_str(), "http://localhost:5173/app/main.js?v=2");
    }

    #[test]
    fn loopback_ip_routes_to_default_target() {
        let route = classify(Some("127.0.0.1:9000"), &uri("/"), &default_target()).unwrap();
        assert!(!route.external);
        assert_eq!(route.upstream.as_str(), "http://localhost:5173/");
    }

    #[test]
    fn foreign_host_routes_to_its_own_origin() {
        let route = classify(Some("cdn.example.com"), &uri("/lib.js?x=1"), &default_target()).unwrap();
        assert!(route.external);
        assert_eq!(route.upstream.as_str(), "http://cdn.example.com/lib.js?x=1");
    }

    #[test]
    fn absolute_form_target_carries_its_own_origin() {
        let route = classify(
            Some("localhost:9000"),
            &uri("http://cdn.example.com/lib.js"),
            &default_target(),
        )
        .unwrap();
        assert!(route.external);
        assert_eq!(route.upstream.as_str(), "http://cdn.example.com/lib.js");
    }

    #[test]
    fn missing_host_is_rejected() {
        assert!(matches!(
            classify(None, &uri("/"), &default_target()),
            Err(RouteError::MissingHost)
        ));
    }

    #[test]
    fn malformed_host_is_rejected() {
        assert!(matches!(
            classify(Some("bad:host:::"), &uri("/"), &default_target()),
            Err(RouteError::MalformedUrl(_))
        ));
    }
}
