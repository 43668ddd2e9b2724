//! Dynamic CORS-Injecting Reverse Proxy
//!
//! The preview panel embeds the app in a frame served from this proxy
//! instead of the dev server directly. That buys two things: a stable
//! origin the panel is allowed to embed, and permissive CORS headers on
//! everything that flows through. Requests addressed to loopback forward
//! to the configured dev server; requests the page makes to third-party
//! origins pass through to those origins unchanged. WebSockets ride the
//! same routing rule so live-reload keeps working.

pub mod cors;
pub mod error;
pub mod route;
pub mod server;
pub mod tunnel;

pub use error::{ProxyError, Result};
pub use route::{classify, ProxyRoute, RouteError};
pub use server::{ProxyConfig, ReverseProxy};
