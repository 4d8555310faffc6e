use serde::{Deserialize, Serialize};

/// Hard ceilings applied while parsing a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    /// Largest accepted `Content-Length`. Larger requests are rejected
    /// before any body byte is read.
    pub max_body_bytes: usize,
    /// JSON bodies up to this size are parsed eagerly; larger ones are left
    /// raw for the handler.
    pub json_parse_limit: usize,
    /// Size of each body read.
    pub body_chunk_size: usize,
    /// Longest request or header line, terminator included.
    pub max_line_bytes: usize,
    pub max_headers: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 600 * 1024,
            json_parse_limit: 16 * 1024,
            body_chunk_size: 4096,
            max_line_bytes: 8192,
            max_headers: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let limits = RequestLimits::default();
        assert_eq!(limits.max_body_bytes, 614_400);
        assert_eq!(limits.json_parse_limit, 16_384);
        assert_eq!(limits.body_chunk_size, 4096);
    }
}
