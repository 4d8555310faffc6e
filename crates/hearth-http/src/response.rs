use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::status::StatusCode;

/// Response payload.
#[derive(Debug)]
pub enum Body {
    Bytes(Bytes),
    /// Streamed from disk in fixed-size blocks. The file is opened when
    /// the response is written.
    File { path: PathBuf, len: u64 },
}

/// An outgoing response. Always carries a `Content-Type`.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    content_type: String,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Response {
    /// Empty `text/plain` response.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            headers: Vec::new(),
            body: Body::Bytes(Bytes::new()),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        let mut response = Self::new(StatusCode::OK);
        response.body = Body::Bytes(Bytes::from(body.into()));
        response
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::text(body).with_content_type("text/html")
    }

    pub fn json(value: &Value) -> Self {
        let mut response = Self::new(StatusCode::OK).with_content_type("application/json");
        response.body = Body::Bytes(Bytes::from(value.to_string()));
        response
    }

    /// Serialize any value as a JSON body.
    pub fn to_json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        let mut response = Self::new(StatusCode::OK).with_content_type("application/json");
        response.body = Body::Bytes(Bytes::from(bytes));
        Ok(response)
    }

    /// `{"error": message}` with the given status.
    pub fn error(status: StatusCode, message: impl fmt::Display) -> Self {
        Self::json(&json!({ "error": message.to_string() })).with_status(status)
    }

    pub fn not_found() -> Self {
        Self::text("Not Found").with_status(StatusCode::NOT_FOUND)
    }

    pub fn internal_error() -> Self {
        Self::text("Internal Server Error").with_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Serve a file from disk with a content type picked by extension.
    /// Missing files and non-files produce a 404.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Self {
                status: StatusCode::OK,
                content_type: content_type_for(path).to_string(),
                headers: Vec::new(),
                body: Body::File {
                    path: path.to_path_buf(),
                    len: meta.len(),
                },
            },
            result => {
                if let Err(e) = result {
                    debug!(path = %path.display(), error = %e, "static file unavailable");
                }
                Self::text("File not found").with_status(StatusCode::NOT_FOUND)
            }
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Add an extra header. `Content-Type` and `Content-Length` are managed
    /// by the response itself.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// In-memory body, `None` for file responses.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Bytes(bytes) => Some(bytes),
            Body::File { .. } => None,
        }
    }

    pub fn content_length(&self) -> u64 {
        match &self.body {
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    fn head(&self) -> String {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n",
            self.status.as_u16(),
            self.status.reason(),
            self.content_type,
            self.content_length(),
        );
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-type") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("Connection: close\r\n\r\n");
        head
    }

    /// Write the status line, headers and body. File bodies go out in
    /// `block_size` chunks, yielding to the scheduler between blocks.
    pub async fn write_to<W>(self, writer: &mut W, block_size: usize) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let head = self.head();
        match self.body {
            Body::Bytes(bytes) => {
                writer.write_all(head.as_bytes()).await?;
                writer.write_all(&bytes).await?;
            }
            Body::File { path, .. } => {
                let mut file = File::open(&path).await?;
                writer.write_all(head.as_bytes()).await?;
                let mut block = vec![0u8; block_size.max(1)];
                loop {
                    let n = file.read(&mut block).await?;
                    if n == 0 {
                        break;
                    }
                    writer.write_all(&block[..n]).await?;
                    tokio::task::yield_now().await;
                }
            }
        }
        writer.flush().await
    }
}

/// Content type by file extension, `text/plain` when unknown.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "text/plain",
    }
}

/// Conversion into a [`Response`], implemented for handler return types.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: IntoResponse,
{
    fn into_response(self) -> Response {
        match self {
            Ok(ok) => ok.into_response(),
            Err(err) => err.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(response: Response, block: usize) -> String {
        let mut out = Vec::new();
        response.write_to(&mut out, block).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn status_line_has_reason_phrase() {
        let text = render(Response::text("hi"), 1024).await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nhi"));
    }

    #[tokio::test]
    async fn error_body_is_json() {
        let response = Response::error(StatusCode::BAD_REQUEST, "missing id");
        assert_eq!(response.content_type(), "application/json");
        let text = render(response, 1024).await;
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.ends_with("{\"error\":\"missing id\"}"));
    }

    #[tokio::test]
    async fn managed_headers_are_not_duplicated() {
        let response = Response::text("x")
            .with_header("content-type", "text/evil")
            .with_header("X-Request", "7");
        let text = render(response, 1024).await;
        assert_eq!(text.matches("Content-Type").count(), 1);
        assert!(text.contains("X-Request: 7\r\n"));
    }

    #[tokio::test]
    async fn file_streams_in_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        let content = "<p>".repeat(1000);
        std::fs::write(&path, &content).unwrap();

        let response = Response::file(&path);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.content_type(), "text/html");
        assert_eq!(response.content_length(), 3000);
        assert!(response.body_bytes().is_none());

        let text = render(response, 64).await;
        assert!(text.contains("Content-Length: 3000\r\n"));
        assert!(text.ends_with(&content));
    }

    #[test]
    fn missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let response = Response::file(dir.path().join("nope.css"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = Response::file(dir.path());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("a/style.CSS")), "text/css");
        assert_eq!(content_type_for(Path::new("app.js")), "application/javascript");
        assert_eq!(content_type_for(Path::new("README")), "text/plain");
    }

    #[test]
    fn result_into_response() {
        let ok: Result<Response, Response> = Ok(Response::text("ok"));
        assert_eq!(ok.into_response().status(), StatusCode::OK);
        let err: Result<Response, Response> = Err(Response::not_found());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
