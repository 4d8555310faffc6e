use thiserror::Error;

use crate::status::StatusCode;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },

    #[error("more than {max} headers")]
    TooManyHeaders { max: usize },

    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    #[error("request body of {declared} bytes exceeds limit of {max}")]
    BodyTooLarge { declared: u64, max: usize },

    #[error("body ended after {received} of {expected} bytes")]
    TruncatedBody { expected: usize, received: usize },

    #[error("connection timed out")]
    Timeout,
}

impl HttpError {
    /// Status to answer a rejected request with, or `None` when the
    /// connection should just be closed.
    pub fn rejection_status(&self) -> Option<StatusCode> {
        match self {
            Self::BodyTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            Self::TooManyHeaders { .. } => Some(StatusCode::HEADER_FIELDS_TOO_LARGE),
            Self::MalformedRequestLine(_)
            | Self::LineTooLong { .. }
            | Self::InvalidContentLength(_)
            | Self::TruncatedBody { .. } => Some(StatusCode::BAD_REQUEST),
            Self::Io(_) | Self::Timeout => None,
        }
    }
}

pub type HttpResult<T> = Result<T, HttpError>;

/// Where a connection was in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    Accepted,
    Parsing,
    Dispatching,
    Writing,
    Closed,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Accepted => "accepted",
            Self::Parsing => "parsing",
            Self::Dispatching => "dispatching",
            Self::Writing => "writing",
            Self::Closed => "closed",
        })
    }
}

/// A connection that ended abnormally.
#[derive(Debug, Error)]
#[error("connection failed while {phase}: {source}")]
pub struct ConnectionError {
    pub phase: ConnectionPhase,
    #[source]
    pub source: HttpError,
}

impl ConnectionError {
    pub fn new(phase: ConnectionPhase, source: impl Into<HttpError>) -> Self {
        Self {
            phase,
            source: source.into(),
        }
    }
}
