//! The in-flight message representation.

use bytes::Bytes;
use http_wire::{is_request, is_response, Direction};

use crate::controller;
use crate::error::ProtocolError;
use crate::manager;
use crate::types::MsgType;

const MAX_HEADERS: usize = 32;

/// An ordered, case-preserving header collection.
///
/// Header order and original casing are part of an endpoint's wire
/// fingerprint, so headers are kept exactly as parsed; lookups are
/// case-insensitive and return the first match, like the devices do.
#[derive(Debug, Clone, Default)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first matching header in place (its stored casing and
    /// position are kept), or append if absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.into(),
            None => self.entries.push((name.to_string(), value.into())),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for HeaderList {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Parsed request line plus headers.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    /// Path plus optional query, exactly as on the request line.
    pub target: String,
    pub version_minor: u8,
    pub headers: HeaderList,
}

impl RequestHead {
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(i) => &self.target[..i],
            None => &self.target,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.target.find('?').map(|i| &self.target[i + 1..])
    }

    /// Replace the query string, keeping the path untouched.
    pub fn set_query(&mut self, query: &str) {
        let path = self.path().to_string();
        self.target = if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        };
    }

    /// First (decoded) value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        let query = self.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get("User-Agent")
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.get("Host")
    }
}

/// Parsed status line plus headers.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version_minor: u8,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderList,
}

/// One framed HTTP message flowing through the proxy.
///
/// Exactly one of `request`/`response` is populated. The original bytes
/// are retained both for fallback emission and for observers that want
/// the unmodified wire form.
#[derive(Debug, Clone)]
pub struct Message {
    direction: Direction,
    pub request: Option<RequestHead>,
    pub response: Option<ResponseHead>,
    pub body: Bytes,
    msg_type: MsgType,
    orig_bytes: Bytes,
    injected: bool,
    dropped: bool,
}

impl Message {
    /// Parse one framed message. Unknown paths or commands never fail the
    /// parse; the message is tagged [`MsgType::Unknown`] and relayed.
    pub fn parse(input: impl Into<Bytes>, direction: Direction) -> Result<Self, ProtocolError> {
        let orig: Bytes = input.into();

        if is_request(&orig) {
            let (head, head_len) = parse_request_head(&orig)?;
            let body = body_slice(&orig, head_len, head.headers.get("Content-Length"));
            let msg_type = match direction {
                Direction::Northbound => controller::northbound_request_type(&head),
                Direction::Southbound => manager::southbound_request_type(&head),
            };
            Ok(Self {
                direction,
                request: Some(head),
                response: None,
                body,
                msg_type,
                orig_bytes: orig,
                injected: false,
                dropped: false,
            })
        } else if is_response(&orig) {
            let (head, head_len) = parse_response_head(&orig)?;
            let body = body_slice(&orig, head_len, head.headers.get("Content-Length"));
            let msg_type = match direction {
                Direction::Northbound => controller::northbound_response_type(&head, &body),
                Direction::Southbound => manager::southbound_response_type(&head, &body),
            };
            Ok(Self {
                direction,
                request: None,
                response: Some(head),
                body,
                msg_type,
                orig_bytes: orig,
                injected: false,
                dropped: false,
            })
        } else {
            Err(ProtocolError::NotHttp)
        }
    }

    /// Build a synthetic request message (used by the injection builders).
    pub fn from_request(direction: Direction, head: RequestHead, body: Bytes) -> Self {
        let msg_type = match direction {
            Direction::Northbound => controller::northbound_request_type(&head),
            Direction::Southbound => manager::southbound_request_type(&head),
        };
        Self {
            direction,
            request: Some(head),
            response: None,
            body,
            msg_type,
            orig_bytes: Bytes::new(),
            injected: false,
            dropped: false,
        }
    }

    /// Build a synthetic response message.
    pub fn from_response(direction: Direction, head: ResponseHead, body: Bytes) -> Self {
        let msg_type = match direction {
            Direction::Northbound => controller::northbound_response_type(&head, &body),
            Direction::Southbound => manager::southbound_response_type(&head, &body),
        };
        Self {
            direction,
            request: None,
            response: Some(head),
            body,
            msg_type,
            orig_bytes: Bytes::new(),
            injected: false,
            dropped: false,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    pub fn is_request(&self) -> bool {
        self.request.is_some()
    }

    pub fn is_response(&self) -> bool {
        self.response.is_some()
    }

    /// The message exactly as it was received, before any transformation.
    pub fn orig_bytes(&self) -> &Bytes {
        &self.orig_bytes
    }

    pub fn injected(&self) -> bool {
        self.injected
    }

    pub fn set_injected(&mut self, injected: bool) {
        self.injected = injected;
    }

    pub fn dropped(&self) -> bool {
        self.dropped
    }

    pub fn mark_dropped(&mut self) {
        self.dropped = true;
    }

    /// Value of the `Content-Type` header, wherever the head lives.
    pub fn content_type(&self) -> Option<&str> {
        match (&self.request, &self.response) {
            (Some(req), _) => req.headers.get("Content-Type"),
            (_, Some(resp)) => resp.headers.get("Content-Type"),
            _ => None,
        }
    }

    /// Render the message back into transmissible bytes.
    ///
    /// Headers are written in stored order; `Content-Length` is refreshed
    /// from the actual body so transformer edits stay consistent. The
    /// output still needs the impersonation pass before hitting the wire.
    pub fn marshal(&self) -> Result<Vec<u8>, ProtocolError> {
        match (&self.request, &self.response) {
            (Some(req), _) => Ok(self.marshal_request(req)),
            (_, Some(resp)) => Ok(self.marshal_response(resp)),
            _ => Err(ProtocolError::EmptyMessage),
        }
    }

    fn marshal_request(&self, req: &RequestHead) -> Vec<u8> {
        let mut headers = req.headers.clone();
        refresh_content_length(&mut headers, self.body.len());

        let mut out = Vec::with_capacity(self.orig_bytes.len().max(128));
        out.extend_from_slice(
            format!("{} {} HTTP/1.{}\r\n", req.method, req.target, req.version_minor).as_bytes(),
        );
        write_headers(&mut out, &headers);
        out.extend_from_slice(&self.body);
        out
    }

    fn marshal_response(&self, resp: &ResponseHead) -> Vec<u8> {
        let mut headers = resp.headers.clone();
        refresh_content_length(&mut headers, self.body.len());

        let mut out = Vec::with_capacity(self.orig_bytes.len().max(128));
        let status_line = if resp.reason.is_empty() {
            format!("HTTP/1.{} {}\r\n", resp.version_minor, resp.status)
        } else {
            format!("HTTP/1.{} {} {}\r\n", resp.version_minor, resp.status, resp.reason)
        };
        out.extend_from_slice(status_line.as_bytes());
        write_headers(&mut out, &headers);
        out.extend_from_slice(&self.body);
        out
    }
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderList) {
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

fn refresh_content_length(headers: &mut HeaderList, body_len: usize) {
    if headers.get("Content-Length").is_some() {
        headers.set("Content-Length", body_len.to_string());
    } else if body_len > 0 {
        headers.push("Content-Length", body_len.to_string());
    }
}

fn parse_request_head(input: &[u8]) -> Result<(RequestHead, usize), ProtocolError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut storage);
    let head_len = match parsed.parse(input)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Err(ProtocolError::IncompleteHead),
    };

    let head = RequestHead {
        method: parsed.method.ok_or(ProtocolError::IncompleteHead)?.to_string(),
        target: parsed.path.ok_or(ProtocolError::IncompleteHead)?.to_string(),
        version_minor: parsed.version.unwrap_or(1),
        headers: collect_headers(parsed.headers),
    };
    Ok((head, head_len))
}

fn parse_response_head(input: &[u8]) -> Result<(ResponseHead, usize), ProtocolError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut storage);
    let head_len = match parsed.parse(input)? {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Err(ProtocolError::IncompleteHead),
    };

    let head = ResponseHead {
        version_minor: parsed.version.unwrap_or(1),
        status: parsed.code.ok_or(ProtocolError::IncompleteHead)?,
        reason: parsed.reason.unwrap_or_default().to_string(),
        headers: collect_headers(parsed.headers),
    };
    Ok((head, head_len))
}

fn collect_headers(headers: &[httparse::Header<'_>]) -> HeaderList {
    headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect()
}

/// The body is `Content-Length` bytes after the head; anything beyond
/// that is the framer-tolerated stray whitespace and is not body.
fn body_slice(orig: &Bytes, head_len: usize, content_length: Option<&str>) -> Bytes {
    let declared = content_length
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let end = (head_len + declared).min(orig.len());
    orig.slice(head_len..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTED: &[u8] = b"POST /eidc/connected HTTP/1.1\r\n\
        Host: fake.server.com\r\n\
        Content-Type: application/json\r\n\
        Content-Length: 13\r\n\
        ServerKey: abc123\r\n\r\n{\"siteKey\":1}";

    #[test]
    fn parse_keeps_header_order_and_case() {
        let msg = Message::parse(CONNECTED, Direction::Northbound).unwrap();
        let req = msg.request.as_ref().unwrap();
        let names: Vec<&str> = req.headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Host", "Content-Type", "Content-Length", "ServerKey"]);
        assert_eq!(req.headers.get("serverkey"), Some("abc123"));
    }

    #[test]
    fn marshal_round_trips_wire_shaped_input() {
        let msg = Message::parse(CONNECTED, Direction::Northbound).unwrap();
        assert_eq!(msg.marshal().unwrap(), CONNECTED);
    }

    #[test]
    fn body_excludes_stray_trailing_whitespace() {
        let wire = b"GET /eidc/heartbeat?seq=1 HTTP/1.1\r\nHost: h\r\n\r\n\r\n";
        let msg = Message::parse(&wire[..], Direction::Southbound).unwrap();
        assert!(msg.body.is_empty());
        assert_eq!(msg.orig_bytes().len(), wire.len());
    }

    #[test]
    fn query_helpers() {
        let wire = b"GET /eidc/getoutbound?username=admin&password=secret&seq=4 HTTP/1.1\r\nHost: h\r\n\r\n";
        let msg = Message::parse(&wire[..], Direction::Southbound).unwrap();
        let req = msg.request.as_ref().unwrap();
        assert_eq!(req.path(), "/eidc/getoutbound");
        assert_eq!(req.query_param("password").as_deref(), Some("secret"));
        assert_eq!(req.query_param("missing"), None);
    }

    #[test]
    fn set_query_replaces_only_the_query() {
        let wire = b"GET /eidc/heartbeat?seq=9 HTTP/1.1\r\nHost: h\r\n\r\n";
        let mut msg = Message::parse(&wire[..], Direction::Southbound).unwrap();
        let req = msg.request.as_mut().unwrap();
        req.set_query("seq=1");
        assert_eq!(req.target, "/eidc/heartbeat?seq=1");
    }

    #[test]
    fn marshal_refreshes_content_length() {
        let mut msg = Message::parse(CONNECTED, Direction::Northbound).unwrap();
        msg.body = Bytes::from_static(b"{}");
        let out = msg.marshal().unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("{}"));
    }

    #[test]
    fn neither_request_nor_response_is_rejected() {
        assert!(matches!(
            Message::parse(&b"hello world\r\n\r\n"[..], Direction::Northbound),
            Err(ProtocolError::NotHttp)
        ));
    }

    #[test]
    fn response_parse_and_round_trip() {
        let wire: &[u8] = b"HTTP/1.1 200 OK\r\n\
            Content-Type: application/json\r\n\
            Content-Length: 26\r\n\r\n{\"serverKey\":\"aabbccddee\"}";
        let msg = Message::parse(wire, Direction::Southbound).unwrap();
        assert!(msg.is_response());
        assert_eq!(msg.response.as_ref().unwrap().status, 200);
        assert_eq!(msg.marshal().unwrap(), wire);
    }
}
