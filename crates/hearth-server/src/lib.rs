//! Record server on top of the hearth store.
//!
//! Exposes every configured collection through a small JSON API, keeps a
//! cached settings document, serves static files, and reports store and
//! cache statistics.

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use context::{AppContext, SETTINGS_SLOT};
pub use error::{HandlerError, HandlerResult, ServerError, ServerResult};
pub use hooks::Heartbeat;
pub use server::HearthServer;
