use hearth_http::{HttpError, IntoResponse, Response, StatusCode};
use hearth_store::StoreError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("http error: {0}")]
    Http(#[from] HttpError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Failure of a single request handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<ServerError> for HandlerError {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::Store(e) => Self::Store(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(msg) => Response::error(StatusCode::BAD_REQUEST, msg),
            Self::Store(e @ StoreError::InvalidPage { .. }) => Response::error(StatusCode::BAD_REQUEST, e),
            Self::NotFound(msg) => Response::error(StatusCode::NOT_FOUND, msg),
            other => {
                error!(error = %other, "handler failed");
                Response::internal_error()
            }
        }
    }
}

pub type HandlerResult = Result<Response, HandlerError>;
