//! Incremental request reader.
//!
//! A request moves through `RequestLine -> Headers -> Body -> Complete`.
//! Any failure rejects it; [`HttpError::rejection_status`] says how to
//! answer. The declared body length is checked against the ceiling before
//! a single body byte is read or buffered.

use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::{debug, trace};

use crate::error::{HttpError, HttpResult};
use crate::limits::RequestLimits;
use crate::request::{Method, Request};
use crate::url::parse_query;

/// Where the parser is in the current request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Headers,
    Body,
    Complete,
}

pub struct RequestParser {
    limits: RequestLimits,
    state: ParseState,
    line: Vec<u8>,
}

impl RequestParser {
    pub fn new(limits: RequestLimits) -> Self {
        Self {
            limits,
            state: ParseState::RequestLine,
            line: Vec::new(),
        }
    }

    /// State reached by the last call to [`parse`](Self::parse); on error,
    /// the state the request was rejected in.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Read one request. Returns `None` when the peer closed the connection
    /// before sending anything.
    pub async fn parse<R>(&mut self, reader: &mut R) -> HttpResult<Option<Request>>
    where
        R: AsyncBufRead + Unpin,
    {
        self.state = ParseState::RequestLine;
        if self.read_line(reader).await? == 0 {
            return Ok(None);
        }
        let mut request = self.request_line()?;

        self.state = ParseState::Headers;
        loop {
            if self.read_line(reader).await? == 0 {
                break;
            }
            let line = trim_line(&self.line);
            if line.is_empty() {
                break;
            }
            let line = String::from_utf8_lossy(line);
            let Some((name, value)) = line.split_once(':') else {
                debug!(line = %line, "ignoring header without colon");
                continue;
            };
            if request.headers.len() >= self.limits.max_headers {
                return Err(HttpError::TooManyHeaders {
                    max: self.limits.max_headers,
                });
            }
            request
                .headers
                .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        self.state = ParseState::Body;
        let length = self.content_length(&request)?;
        request.body = self.read_body(reader, length).await?;
        request.json = self.eager_json(&request);

        self.state = ParseState::Complete;
        trace!(method = %request.method, path = %request.path, body = request.body.len(), "request parsed");
        Ok(Some(request))
    }

    /// Read up to and including `\n` into `self.line`, bounded by the line
    /// limit. Returns the byte count, 0 at EOF.
    async fn read_line<R>(&mut self, reader: &mut R) -> HttpResult<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        self.line.clear();
        let cap = self.limits.max_line_bytes as u64 + 1;
        let mut limited = (&mut *reader).take(cap);
        let n = limited.read_until(b'\n', &mut self.line).await?;
        if n > self.limits.max_line_bytes {
            return Err(HttpError::LineTooLong {
                max: self.limits.max_line_bytes,
            });
        }
        Ok(n)
    }

    fn request_line(&self) -> HttpResult<Request> {
        let raw = trim_line(&self.line);
        let line = std::str::from_utf8(raw)
            .map_err(|_| HttpError::MalformedRequestLine(String::from_utf8_lossy(raw).into_owned()))?;

        let mut parts = line.split_whitespace();
        let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
            return Err(HttpError::MalformedRequestLine(line.to_string()));
        };

        let method: Method = match method.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        };
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        let mut request = Request::new(method, path);
        if !query.is_empty() {
            request.query_string = query.to_string();
            request.args = parse_query(query);
        }
        Ok(request)
    }

    fn content_length(&self, request: &Request) -> HttpResult<usize> {
        let Some(raw) = request.header("content-length") else {
            return Ok(0);
        };
        let declared: u64 = raw
            .parse()
            .map_err(|_| HttpError::InvalidContentLength(raw.to_string()))?;
        if declared > self.limits.max_body_bytes as u64 {
            return Err(HttpError::BodyTooLarge {
                declared,
                max: self.limits.max_body_bytes,
            });
        }
        Ok(declared as usize)
    }

    async fn read_body<R>(&self, reader: &mut R, length: usize) -> HttpResult<Bytes>
    where
        R: AsyncBufRead + Unpin,
    {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let chunk = self.limits.body_chunk_size.max(1);
        let mut body = BytesMut::with_capacity(length);
        while body.len() < length {
            let want = (length - body.len()).min(chunk) as u64;
            let n = (&mut *reader).take(want).read_buf(&mut body).await?;
            if n == 0 {
                return Err(HttpError::TruncatedBody {
                    expected: length,
                    received: body.len(),
                });
            }
        }
        Ok(body.freeze())
    }

    fn eager_json(&self, request: &Request) -> Option<Value> {
        if request.body.is_empty() || request.body.len() > self.limits.json_parse_limit {
            return None;
        }
        if !request
            .content_type()
            .is_some_and(|ct| ct.starts_with("application/json"))
        {
            return None;
        }
        match serde_json::from_slice(&request.body) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "request body is not valid JSON");
                None
            }
        }
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
