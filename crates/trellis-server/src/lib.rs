//! The Trellis HTTP server and process lifecycle.
//!
//! - [`config`]: environment-driven application settings and the
//!   server's own tunables
//! - [`logging`]: `tracing` subscriber initialisation
//! - [`server`]: the accept loop and per-connection service
//! - [`shutdown`]: OS-signal handling, connection draining, and the
//!   staged teardown of background work

pub mod config;
pub mod logging;
pub mod server;
pub mod shutdown;

pub use config::{AppConfig, ServerConfig};
pub use server::{Server, ServerError};
pub use shutdown::{wait_for_signal, ConnectionToken, ConnectionTracker, Teardown};
