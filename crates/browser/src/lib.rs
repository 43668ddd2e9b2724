//! Browser Process Management and Debug Discovery
//!
//! This crate owns the headless-browser side of the preview core: spawning
//! and supervising the browser process, waiting for its remote-debugging
//! endpoint, and mapping a logical page URL to a live inspector URL.
//!
//! Design notes:
//!
//! 1. **One process per supervisor**: a relaunch always kills and reaps the
//!    old child before spawning, so ports and profile dirs never collide.
//! 2. **Negative outcomes are not errors**: an endpoint or target that
//!    never appears resolves to `None`; only spawn failures are `Err`.
//! 3. **One retry machine**: both discovery loops run on the same bounded,
//!    timer-driven, cancellable [`retry::RetryPolicy`].

pub mod error;
pub mod probe;
pub mod retry;
pub mod supervisor;
pub mod targets;

pub use error::{BrowserError, Result};
pub use probe::EndpointProber;
pub use retry::RetryPolicy;
pub use supervisor::{ChromeSupervisor, ProcessState, SupervisorConfig};
pub use targets::{normalize_url, DebugTarget, TargetResolver};
