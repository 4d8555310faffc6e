//! # hearth-http
//!
//! A deliberately small HTTP/1.1 stack for one request per connection:
//!
//! - [`RequestParser`]: bounded, incremental request reading with
//!   early rejection of oversize bodies
//! - [`Response`]: in-memory or streamed file bodies with reason phrases
//! - [`Router`]: exact `(method, path)` dispatch over exclusive state
//! - [`HttpServer`]: the sequential accept loop with shutdown and hooks

pub mod error;
pub mod hooks;
pub mod limits;
pub mod parser;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod status;
pub mod url;

pub use error::{ConnectionError, ConnectionPhase, HttpError, HttpResult};
pub use hooks::{DispatchHook, NoOpHook};
pub use limits::RequestLimits;
pub use parser::{ParseState, RequestParser};
pub use request::{Method, Request};
pub use response::{content_type_for, Body, IntoResponse, Response};
pub use router::Router;
pub use server::{HttpServer, ServeOptions};
pub use status::StatusCode;
