//! Query-string helpers. The parser never decodes values; handlers call
//! [`unquote`] on the ones they need.

use std::collections::HashMap;

/// Split a raw query string into `key=value` pairs, leaving values encoded.
/// Pairs without `=` are ignored; a repeated key keeps its last value.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Decode `+` as a space and `%XX` escapes as UTF-8 bytes.
///
/// Malformed escapes are kept literally. If the decoded bytes are not valid
/// UTF-8 the input is returned with only `+` replaced.
pub fn unquote(s: &str) -> String {
    let plus_decoded = s.replace('+', " ");
    if !plus_decoded.contains('%') {
        return plus_decoded;
    }

    let bytes = plus_decoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (hex(bytes.get(i + 1)), hex(bytes.get(i + 2))) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).unwrap_or(plus_decoded)
}

fn hex(byte: Option<&u8>) -> Option<u8> {
    let b = *byte?;
    (b as char).to_digit(16).map(|d| d as u8)
}
