//! Preview Core - Collaborator-Facing API
//!
//! The surface a UI layer (panel rendering, command registration, output
//! presentation) consumes: launch and dispose the headless browser, start
//! and stop the content proxy, and resolve inspector URLs. Everything here
//! returns structured results; presenting failures to the user is the UI
//! layer's job.
//!
//! ```no_run
//! use preview::{PreviewConfig, PreviewSession};
//!
//! # async fn open() -> preview::Result<()> {
//! let session = PreviewSession::new(PreviewConfig::new("/usr/bin/google-chrome"))?;
//! if let Some(ws_url) = session.launch("http://localhost:5173/").await? {
//!     session.start_proxy().await?;
//!     // embed session.preview_url() in the panel; ws_url drives debugging
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod session;

pub use config::PreviewConfig;
pub use error::{PreviewError, Result};
pub use session::PreviewSession;
