//! Byte-level reshaping of re-serialized HTTP messages.
//!
//! Each impersonated endpoint emits headers in a fixed order with fixed
//! casing quirks. A freshly marshalled message is correct HTTP but carries
//! our own fingerprint; these routines rewrite known header lines and
//! stable-sort the header block into the target endpoint's order so the
//! result is indistinguishable from the real thing on the wire.
//!
//! Ordering tables are matched case-insensitively; rewrite prefixes are
//! case-sensitive (they exist to fix casing). Lines matching no table
//! entry keep their original relative order after the ordered prefix.

use crate::classify::{
    content_length, find, is_request, is_response, line_has_prefix_ci, Direction, CRLF, CRLF_CRLF,
};
use crate::error::WireError;
use crate::MANAGER_USER_AGENT;

const CONTROLLER_REQUEST_ORDER: [&str; 5] = [
    "POST ",
    "Host: ",
    "Content-Type: ",
    "Content-Length: ",
    "ServerKey:",
];

const CONTROLLER_RESPONSE_ORDER: [&str; 5] = [
    "HTTP",
    "Server:",
    "Content-type:",
    "Content-Length:",
    "Cache-Control:",
];

const MANAGER_REQUEST_ORDER: [&str; 6] = [
    "POST",
    "GET",
    "Host:",
    "User-Agent:",
    "Content-Type:",
    "Content-Length:",
];

const MANAGER_RESPONSE_ORDER: [&str; 3] = ["HTTP", "Content-Type:", "Content-Length:"];

const MANAGER_QUERY_ORDER: [&str; 3] = ["username=", "password=", "seq="];

const CONTROLLER_REQUEST_REWRITE: [(&str, &str); 1] = [("Serverkey:", "ServerKey:")];

// The controller spells it "Content-type" and pads the length value with a
// second space.
const CONTROLLER_RESPONSE_REWRITE: [(&str, &str); 2] = [
    ("Content-Type:", "Content-type:"),
    ("Content-Length:", "Content-Length: "),
];

/// Reshape `input` to match the wire signature of whichever endpoint
/// originates messages travelling in `direction`.
pub fn impersonate(input: &[u8], direction: Direction) -> Result<Vec<u8>, WireError> {
    match (is_request(input), is_response(input), direction) {
        (true, _, Direction::Northbound) => impersonate_controller_request(input),
        (true, _, Direction::Southbound) => impersonate_manager_request(input),
        (_, true, Direction::Northbound) => impersonate_controller_response(input),
        (_, true, Direction::Southbound) => impersonate_manager_response(input),
        _ => Err(WireError::NotHttp),
    }
}

/// Make a request look like it came from a real controller.
pub fn impersonate_controller_request(input: &[u8]) -> Result<Vec<u8>, WireError> {
    let (mut lines, tail) = split_head(input)?;
    for line in &mut lines {
        rewrite_line(line, &CONTROLLER_REQUEST_REWRITE);
    }
    sort_lines(&mut lines, &CONTROLLER_REQUEST_ORDER);
    Ok(join(lines, tail, false))
}

/// Make a response look like it came from the controller's web server.
///
/// The controller never sends a `Connection` header, so any present is
/// dropped.
pub fn impersonate_controller_response(input: &[u8]) -> Result<Vec<u8>, WireError> {
    let (lines, tail) = split_head(input)?;
    let mut lines: Vec<String> = lines
        .into_iter()
        .filter(|l| !l.starts_with("Connection:"))
        .collect();
    for line in &mut lines {
        rewrite_line(line, &CONTROLLER_RESPONSE_REWRITE);
    }
    sort_lines(&mut lines, &CONTROLLER_RESPONSE_ORDER);
    Ok(join(lines, tail, false))
}

/// Make a request look like it came from the real manager's listener.
///
/// Query parameters on the request line are reordered to
/// `username, password, seq`, and the listener's empty-`GET` extra-CRLF
/// bug is reproduced.
pub fn impersonate_manager_request(input: &[u8]) -> Result<Vec<u8>, WireError> {
    let (mut lines, tail) = split_head(input)?;
    if lines.is_empty() {
        return Err(WireError::NotHttp);
    }
    lines[0] = sort_query_params(&lines[0]);
    sort_lines(&mut lines, &MANAGER_REQUEST_ORDER);

    let extra_crlf = wants_listener_extra_crlf(input, &lines)?;
    Ok(join(lines, tail, extra_crlf))
}

/// Make a response look like it came from the real manager.
pub fn impersonate_manager_response(input: &[u8]) -> Result<Vec<u8>, WireError> {
    let (mut lines, tail) = split_head(input)?;
    sort_lines(&mut lines, &MANAGER_RESPONSE_ORDER);
    Ok(join(lines, tail, false))
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Split `input` into header lines (terminators stripped) plus the raw
/// tail starting at the header block's final CRLF, mirroring how the
/// ordering tables treat the method/status line as just another line.
fn split_head(input: &[u8]) -> Result<(Vec<String>, &[u8]), WireError> {
    let head_end = find(input, CRLF_CRLF)
        .map(|i| i + 2)
        .ok_or(WireError::MissingHeaderEnd(input.len()))?;

    let lines = input[..head_end]
        .split(|&b| b == b'\n')
        .map(|l| match l.last() {
            Some(b'\r') => &l[..l.len() - 1],
            _ => l,
        })
        .filter(|l| !l.is_empty())
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .collect();

    Ok((lines, &input[head_end..]))
}

fn rewrite_line(line: &mut String, table: &[(&str, &str)]) {
    for (from, to) in table {
        if let Some(rest) = line.strip_prefix(from) {
            *line = format!("{to}{rest}");
            return;
        }
    }
}

/// Stable sort by first matching ordering-table entry; non-matching lines
/// sort after every matching one in their original order.
fn sort_lines(lines: &mut [String], order: &[&str]) {
    lines.sort_by_key(|line| order_key(line, order));
}

fn order_key(line: &str, order: &[&str]) -> usize {
    order
        .iter()
        .position(|prefix| line_has_prefix_ci(line.as_bytes(), prefix.as_bytes()))
        .unwrap_or(order.len())
}

fn join(lines: Vec<String>, tail: &[u8], extra_crlf: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(lines.iter().map(|l| l.len() + 2).sum::<usize>() + tail.len() + 2);
    for line in &lines {
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(CRLF);
    }
    if extra_crlf {
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(tail);
    out
}

/// Empty (zero Content-Length) `GET` requests from the manager's listener
/// carry a bogus extra newline after the header terminator.
fn wants_listener_extra_crlf(input: &[u8], lines: &[String]) -> Result<bool, WireError> {
    let method_is_get = lines
        .iter()
        .any(|l| l.starts_with("GET "));
    if !method_is_get {
        return Ok(false);
    }

    let ua = lines
        .iter()
        .find(|l| line_has_prefix_ci(l.as_bytes(), b"user-agent:"))
        .map(|l| l["user-agent:".len()..].trim());
    if ua != Some(MANAGER_USER_AGENT) {
        return Ok(false);
    }

    let head_end = find(input, CRLF_CRLF).map(|i| i + 4).unwrap_or(input.len());
    Ok(content_length(&input[..head_end])?.unwrap_or(0) == 0)
}

/// Reorder the query parameters of a request line such as
/// `GET /path?b=2&a=1 HTTP/1.1` according to [`MANAGER_QUERY_ORDER`].
/// Fragments and lines without query strings pass through untouched.
fn sort_query_params(line: &str) -> String {
    let mut parts: Vec<&str> = line.split(' ').collect();
    if parts.len() < 2 {
        return line.to_string();
    }

    let target = parts[1];
    let Some(q) = target.find('?') else {
        return line.to_string();
    };

    let (before, rest) = target.split_at(q + 1);
    let (params, fragment) = match rest.find('#') {
        Some(h) => rest.split_at(h),
        None => (rest, ""),
    };

    let mut pairs: Vec<&str> = params.split('&').collect();
    pairs.sort_by_key(|p| order_key(p, &MANAGER_QUERY_ORDER));

    let rebuilt = format!("{before}{}{fragment}", pairs.join("&"));
    parts[1] = &rebuilt;
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // manager requests
    // -----------------------------------------------------------------------

    #[test]
    fn manager_request_header_order() {
        let input = b"POST /eidc/setTime?username=admin&password=admin&seq=2 HTTP/1.1\r\n\
                      Content-Length: 5\r\n\
                      Content-Type: application/json\r\n\
                      User-Agent: eIDCListener\r\n\
                      Host: 192.168.6.40\r\n\r\n{\"a\":1}";
        let out = impersonate_manager_request(input).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert!(lines[0].starts_with("POST "));
        assert!(lines[1].starts_with("Host:"));
        assert!(lines[2].starts_with("User-Agent:"));
        assert!(lines[3].starts_with("Content-Type:"));
        assert!(lines[4].starts_with("Content-Length:"));
    }

    #[test]
    fn manager_query_param_order() {
        let line = "GET /eidc/heartbeat?password=a&seq=3&username=b HTTP/1.1";
        assert_eq!(
            sort_query_params(line),
            "GET /eidc/heartbeat?username=b&password=a&seq=3 HTTP/1.1"
        );
    }

    #[test]
    fn query_sort_preserves_fragment() {
        let line = "GET /x?seq=1&username=u#frag HTTP/1.1";
        assert_eq!(sort_query_params(line), "GET /x?username=u&seq=1#frag HTTP/1.1");
    }

    #[test]
    fn query_sort_without_query_is_untouched() {
        let line = "GET /eidc/heartbeat HTTP/1.1";
        assert_eq!(sort_query_params(line), line);
    }

    #[test]
    fn empty_get_gains_listener_extra_crlf() {
        let input = b"GET /eidc/heartbeat?username=a&password=b&seq=1 HTTP/1.1\r\n\
                      Host: 192.168.6.40\r\n\
                      User-Agent: eIDCListener\r\n\r\n";
        let out = impersonate_manager_request(input).unwrap();
        assert!(out.ends_with(b"\r\n\r\n\r\n"));
    }

    #[test]
    fn post_does_not_gain_extra_crlf() {
        let input = b"POST /eidc/eventack?username=a&password=b&seq=1 HTTP/1.1\r\n\
                      Host: 192.168.6.40\r\n\
                      User-Agent: eIDCListener\r\n\
                      Content-Length: 2\r\n\r\n{}";
        let out = impersonate_manager_request(input).unwrap();
        assert!(out.ends_with(b"\r\n\r\n{}"));
    }

    #[test]
    fn foreign_user_agent_gets_no_extra_crlf() {
        let input = b"GET /eidc/heartbeat HTTP/1.1\r\n\
                      Host: 192.168.6.40\r\n\
                      User-Agent: curl/8.0\r\n\r\n";
        let out = impersonate_manager_request(input).unwrap();
        assert!(out.ends_with(b"curl/8.0\r\n\r\n"));
    }

    // -----------------------------------------------------------------------
    // controller requests / responses
    // -----------------------------------------------------------------------

    #[test]
    fn controller_request_order_and_serverkey_case() {
        let input = b"POST /eidc/connected HTTP/1.1\r\n\
                      Serverkey: 9c6e4f9330f54e4b8b911d5a22e85a6b\r\n\
                      Content-Length: 2\r\n\
                      Content-Type: application/json\r\n\
                      Host: fake.server.com\r\n\r\n{}";
        let out = impersonate_controller_request(input).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert!(lines[0].starts_with("POST "));
        assert!(lines[1].starts_with("Host:"));
        assert!(lines[2].starts_with("Content-Type:"));
        assert!(lines[3].starts_with("Content-Length:"));
        assert!(lines[4].starts_with("ServerKey: 9c6e"));
    }

    #[test]
    fn controller_response_content_type_casing() {
        let input = b"HTTP/1.0 200 OK\r\n\
                      Content-Type: application/json\r\n\
                      Content-Length: 32\r\n\
                      Cache-Control: no-cache\r\n\
                      Server: eIDC32 WebServer\r\n\r\n{\"result\":true, \"cmd\":\"SETTIME\"}";
        let out = impersonate_controller_response(input).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-type: application/json"));
        // Length value gains the controller's double space.
        assert!(text.contains("Content-Length:  32"));
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert!(lines[0].starts_with("HTTP/1.0 200 OK"));
        assert!(lines[1].starts_with("Server:"));
        assert!(lines[2].starts_with("Content-type:"));
        assert!(lines[3].starts_with("Content-Length:"));
        assert!(lines[4].starts_with("Cache-Control:"));
    }

    #[test]
    fn controller_response_drops_connection_header() {
        let input = b"HTTP/1.0 200 OK\r\n\
                      Connection: close\r\n\
                      Server: eIDC32 WebServer\r\n\r\n";
        let out = impersonate_controller_response(input).unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("Connection:"));
    }

    // -----------------------------------------------------------------------
    // dispatch / stability
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_headers_keep_relative_order_after_prefix() {
        let input = b"HTTP/1.1 200 OK\r\n\
                      X-First: 1\r\n\
                      Content-Length: 0\r\n\
                      X-Second: 2\r\n\
                      Content-Type: application/json\r\n\r\n";
        let out = impersonate_manager_response(input).unwrap();
        let text = String::from_utf8(out).unwrap();
        let first = text.find("X-First").unwrap();
        let second = text.find("X-Second").unwrap();
        let ct = text.find("Content-Type").unwrap();
        assert!(ct < first && first < second);
    }

    #[test]
    fn dispatch_rejects_non_http() {
        assert!(matches!(
            impersonate(b"garbage\r\n\r\n", Direction::Northbound),
            Err(WireError::NotHttp)
        ));
    }

    #[test]
    fn already_canonical_message_is_unchanged() {
        let input: &[u8] = b"POST /eidc/connected HTTP/1.1\r\n\
            Host: fake.server.com\r\n\
            Content-Type: application/json\r\n\
            Content-Length: 2\r\n\
            ServerKey: abc123\r\n\r\n{}";
        let out = impersonate(input, Direction::Northbound).unwrap();
        assert_eq!(out, input);
    }
}
