//! Request/response detection and header-block utilities.

use std::fmt;
use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::error::WireError;

pub(crate) const CRLF: &[u8] = b"\r\n";
pub(crate) const CRLF_CRLF: &[u8] = b"\r\n\r\n";

/// Which way a message is travelling through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Controller to manager.
    Northbound,
    /// Manager to controller.
    Southbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Northbound => write!(f, "Northbound"),
            Direction::Southbound => write!(f, "Southbound"),
        }
    }
}

const REQUEST_METHODS: [&[u8]; 8] = [
    b"OPTIONS ",
    b"GET ",
    b"HEAD ",
    b"POST ",
    b"PUT ",
    b"DELETE ",
    b"TRACE ",
    b"CONNECT ",
];

static RESPONSE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HTTP/[0-9]+\.[0-9]+ ").expect("response-line regex"));

static CL_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new("[0-9]+").expect("digit regex"));

/// True when `data` starts with an HTTP method followed by a space.
pub fn is_request(data: &[u8]) -> bool {
    REQUEST_METHODS.iter().any(|m| data.starts_with(m))
}

/// True when the first line of `data` is an HTTP status line.
pub fn is_response(data: &[u8]) -> bool {
    match find(data, CRLF) {
        Some(0) | None => false,
        Some(end) => RESPONSE_LINE.is_match(&data[..end]),
    }
}

/// Offset of the first occurrence of `needle` within `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Offset one past the CRLFCRLF header terminator, if buffered.
pub fn header_end(data: &[u8]) -> Option<usize> {
    find(data, CRLF_CRLF).map(|i| i + CRLF_CRLF.len())
}

/// Extract the `Content-Length` value from a raw header block.
///
/// Returns `Ok(None)` when no such header is present. The header name is
/// matched case-insensitively; the value is the first run of digits on the
/// line, which is how the impersonated endpoints read it too.
pub fn content_length(header: &[u8]) -> Result<Option<usize>, WireError> {
    for line in header.split(|&b| b == b'\n') {
        let line = strip_cr(line);
        if !line_has_prefix_ci(line, b"content-length:") {
            continue;
        }
        let digits = CL_DIGITS
            .find(line)
            .ok_or_else(|| WireError::ContentLength(String::from_utf8_lossy(line).into_owned()))?;
        let text = std::str::from_utf8(digits.as_bytes())
            .map_err(|_| WireError::ContentLength(String::from_utf8_lossy(line).into_owned()))?;
        let value = text
            .parse::<usize>()
            .map_err(|_| WireError::ContentLength(String::from_utf8_lossy(line).into_owned()))?;
        return Ok(Some(value));
    }
    Ok(None)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

pub(crate) fn line_has_prefix_ci(line: &[u8], prefix: &[u8]) -> bool {
    line.len() >= prefix.len()
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_detection() {
        assert!(is_request(b"GET /eidc/heartbeat HTTP/1.1\r\n\r\n"));
        assert!(is_request(b"POST /eidc/connected HTTP/1.1\r\n\r\n"));
        assert!(!is_request(b"HTTP/1.0 200 OK\r\n\r\n"));
        assert!(!is_request(b"GETAWAY /x HTTP/1.1\r\n\r\n"));
    }

    #[test]
    fn response_detection() {
        assert!(is_response(b"HTTP/1.0 200 OK\r\n\r\n"));
        assert!(is_response(b"HTTP/1.1 404 Not Found\r\n\r\n"));
        assert!(!is_response(b"POST /eidc/connected HTTP/1.1\r\n\r\n"));
        // No CRLF at all: not classifiable.
        assert!(!is_response(b"HTTP/1.1 200 OK"));
    }

    #[test]
    fn content_length_case_insensitive() {
        let header = b"POST /x HTTP/1.1\r\ncontent-LENGTH: 42\r\n\r\n";
        assert_eq!(content_length(header).unwrap(), Some(42));
    }

    #[test]
    fn content_length_absent() {
        let header = b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n";
        assert_eq!(content_length(header).unwrap(), None);
    }

    #[test]
    fn content_length_garbage_is_an_error() {
        let header = b"GET /x HTTP/1.1\r\nContent-Length: none\r\n\r\n";
        assert!(content_length(header).is_err());
    }

    #[test]
    fn header_end_points_past_terminator() {
        let data = b"GET /x HTTP/1.1\r\nHost: h\r\n\r\nbody";
        assert_eq!(header_end(data), Some(data.len() - 4));
    }
}
