//! Builders for synthetic messages.
//!
//! Injected messages have to be indistinguishable from the real thing, so
//! the builders here produce [`Message`] values whose marshalled form
//! matches each endpoint's habits: the manager's listener default host and
//! user agent on southbound requests, the controller web server's wrapper
//! bodies and `HTTP/1.0` status line on northbound responses.

use bytes::Bytes;
use http_wire::{Direction, CONTROLLER_SERVER_NAME, MANAGER_USER_AGENT};
use serde::Serialize;
use std::fmt;

use crate::controller::SimpleResponse;
use crate::error::ProtocolError;
use crate::manager::{
    DoorLockStatusRequest, EventAckRequest, DOOR_LOCK_STATUS_URI, EVENT_ACK_URI, HEARTBEAT_URI,
    QUERY_PASSWORD, QUERY_SEQ, QUERY_USERNAME,
};
use crate::message::{HeaderList, Message, RequestHead, ResponseHead};
use crate::APPLICATION_JSON;

/// Host the manager's listener presents in its own requests. Injected
/// southbound messages reuse it so they blend in.
pub const DEFAULT_MANAGER_HOST: &str = "192.168.6.40";

/// Desired door lock state for a `door/lockstatus` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    Locked,
    Normal,
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStatus::Unlocked => f.write_str("Unlocked"),
            LockStatus::Locked => f.write_str("Locked"),
            LockStatus::Normal => f.write_str("Normal"),
        }
    }
}

/// Query string in the listener's encoding: parameters appear in
/// alphabetical order and the sequence number starts at zero (the
/// resequencer rewrites it on emission).
fn manager_query(username: &str, password: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair(QUERY_PASSWORD, password)
        .append_pair(QUERY_SEQ, "0")
        .append_pair(QUERY_USERNAME, username)
        .finish()
}

fn manager_request(
    method: &str,
    path: &str,
    username: &str,
    password: &str,
    body: Option<Vec<u8>>,
) -> Message {
    let mut headers = HeaderList::new();
    headers.push("Host", DEFAULT_MANAGER_HOST);
    headers.push("User-Agent", MANAGER_USER_AGENT);
    if body.is_some() {
        headers.push("Content-Type", APPLICATION_JSON);
    }

    let head = RequestHead {
        method: method.to_string(),
        target: format!("{path}?{}", manager_query(username, password)),
        version_minor: 1,
        headers,
    };
    Message::from_request(
        Direction::Southbound,
        head,
        body.map(Bytes::from).unwrap_or_default(),
    )
}

/// Synthetic southbound `GET /eidc/heartbeat`.
pub fn heartbeat_msg(username: &str, password: &str) -> Message {
    manager_request("GET", HEARTBEAT_URI, username, password, None)
}

/// Synthetic southbound `POST /eidc/eventack` acknowledging one event.
pub fn event_ack_msg(
    username: &str,
    password: &str,
    event_id: i64,
) -> Result<Message, ProtocolError> {
    let body = serde_json::to_vec(&EventAckRequest {
        event_ids: vec![event_id],
    })?;
    Ok(manager_request(
        "POST",
        EVENT_ACK_URI,
        username,
        password,
        Some(body),
    ))
}

/// Synthetic southbound `POST /eidc/door/lockstatus`.
pub fn lock_status_msg(
    username: &str,
    password: &str,
    status: LockStatus,
) -> Result<Message, ProtocolError> {
    let body = serde_json::to_vec(&DoorLockStatusRequest {
        status: status.to_string(),
        duration: -1,
    })?;
    Ok(manager_request(
        "POST",
        DOOR_LOCK_STATUS_URI,
        username,
        password,
        Some(body),
    ))
}

/// Body for a synthetic request or response.
#[derive(Debug, Clone)]
pub enum BodySpec {
    /// Pre-encoded bytes, used verbatim.
    Raw(Vec<u8>),
    /// Any serialisable value, encoded as JSON.
    Json(serde_json::Value),
}

impl BodySpec {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ProtocolError> {
        Ok(BodySpec::Json(serde_json::to_value(value)?))
    }

    fn into_bytes(self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            BodySpec::Raw(raw) => Ok(raw),
            BodySpec::Json(value) => Ok(serde_json::to_vec(&value)?),
        }
    }
}

/// Describes a northbound request toward the manager, as a controller
/// would send it. Used by embedders that speak to a manager directly.
#[derive(Debug, Clone, Default)]
pub struct ControllerRequestSpec {
    /// Manager host, used for the `Host` header.
    pub host: String,
    /// Request path; may already carry a query string.
    pub path: String,
    pub method: String,
    /// Value of the `ServerKey` header; controllers always send one.
    pub server_key: String,
    /// Extra headers; an entry replaces any same-named default.
    pub headers: Vec<(String, String)>,
    pub body: Option<BodySpec>,
}

impl ControllerRequestSpec {
    pub fn build(self) -> Result<Message, ProtocolError> {
        if self.host.is_empty() {
            return Err(ProtocolError::Builder("host cannot be empty".into()));
        }
        if self.method.is_empty() {
            return Err(ProtocolError::Builder("method cannot be empty".into()));
        }
        if self.server_key.is_empty() {
            return Err(ProtocolError::Builder("server key cannot be empty".into()));
        }

        let body = self.body.map(BodySpec::into_bytes).transpose()?;

        let mut headers = HeaderList::new();
        headers.push("Host", &self.host);
        if body.is_some() {
            headers.push("Content-Type", APPLICATION_JSON);
        }
        headers.push("ServerKey", &self.server_key);
        for (name, value) in &self.headers {
            headers.set(name, value.clone());
        }

        let head = RequestHead {
            method: self.method,
            target: self.path,
            version_minor: 1,
            headers,
        };
        Ok(Message::from_request(
            Direction::Northbound,
            head,
            body.map(Bytes::from).unwrap_or_default(),
        ))
    }
}

/// Describes a northbound response as the controller's web server would
/// send it: `HTTP/1.0`, `Server` and `Cache-Control` headers, and the
/// simple/body wrapper convention.
#[derive(Debug, Clone, Default)]
pub struct ControllerResponseSpec {
    pub status: u16,
    /// Extra headers; an entry replaces any same-named default.
    pub headers: Vec<(String, String)>,
    /// Wrapper echoing the command. When both `wrapper` and `body` are
    /// set, the wrapper is upgraded to the body-carrying form.
    pub wrapper: Option<SimpleResponse>,
    pub body: Option<BodySpec>,
}

impl ControllerResponseSpec {
    pub fn build(self) -> Result<Message, ProtocolError> {
        if self.status == 0 {
            return Err(ProtocolError::Builder("status code cannot be 0".into()));
        }

        let inner = self.body.map(BodySpec::into_bytes).transpose()?;
        let body = match (self.wrapper, inner) {
            (Some(wrapper), Some(inner)) => {
                let upgraded = crate::controller::BodyResponse {
                    cmd: wrapper.cmd,
                    result: wrapper.result,
                    body: serde_json::from_slice(&inner)?,
                };
                serde_json::to_vec(&upgraded)?
            }
            (Some(wrapper), None) => serde_json::to_vec(&wrapper)?,
            (None, Some(inner)) => inner,
            (None, None) => Vec::new(),
        };

        let mut headers = HeaderList::new();
        headers.push("Server", CONTROLLER_SERVER_NAME);
        if !body.is_empty() {
            headers.push("Content-Type", APPLICATION_JSON);
            headers.push("Content-Length", body.len().to_string());
        }
        headers.push("Cache-Control", "no-cache");
        for (name, value) in &self.headers {
            headers.set(name, value.clone());
        }

        let head = ResponseHead {
            version_minor: 0,
            status: self.status,
            reason: status_reason(self.status).to_string(),
            headers,
        };
        Ok(Message::from_response(
            Direction::Northbound,
            head,
            Bytes::from(body),
        ))
    }
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Replace the value of `header` (format `Name: `) in a raw HTTP message.
///
/// Escape hatch for wire experiments that the typed model refuses to
/// express, e.g. a deliberately wrong `Content-Length`.
pub fn replace_header_value(
    header: &[u8],
    new_value: &[u8],
    raw: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let start = find_subslice(raw, header).ok_or_else(|| {
        ProtocolError::HeaderNotFound(String::from_utf8_lossy(header).into_owned())
    })?;
    let value_start = start + header.len();
    let value_len = raw[value_start..]
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .ok_or_else(|| {
            ProtocolError::HeaderNotFound(String::from_utf8_lossy(header).into_owned())
        })?;

    let mut out = Vec::with_capacity(raw.len() - value_len + new_value.len());
    out.extend_from_slice(&raw[..value_start]);
    out.extend_from_slice(new_value);
    out.extend_from_slice(&raw[value_start + value_len..]);
    Ok(out)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MsgType;

    #[test]
    fn heartbeat_marshals_to_listener_bytes() {
        let msg = heartbeat_msg("admin", "admin");
        let wire = msg.marshal().unwrap();
        assert_eq!(
            wire,
            b"GET /eidc/heartbeat?password=admin&seq=0&username=admin HTTP/1.1\r\n\
              Host: 192.168.6.40\r\nUser-Agent: eIDCListener\r\n\r\n"
        );
        assert_eq!(msg.msg_type(), MsgType::HeartbeatRequest);
        assert_eq!(msg.direction(), Direction::Southbound);
    }

    #[test]
    fn event_ack_carries_the_event_id() {
        let msg = event_ack_msg("admin", "admin", 1234).unwrap();
        assert_eq!(msg.msg_type(), MsgType::EventAckRequest);
        let parsed = msg.parse_event_ack_request().unwrap();
        assert_eq!(parsed.event_ids, vec![1234]);
        let wire = msg.marshal().unwrap();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("POST /eidc/eventack?password=admin&seq=0&username=admin HTTP/1.1\r\n"));
        assert!(text.contains("Content-Length: "));
    }

    #[test]
    fn lock_status_body_shape() {
        let msg = lock_status_msg("admin", "admin", LockStatus::Unlocked).unwrap();
        assert_eq!(msg.msg_type(), MsgType::DoorLockStatusRequest);
        assert_eq!(&msg.body[..], br#"{"status":"Unlocked","duration":-1}"#);
    }

    #[test]
    fn controller_request_spec_requires_server_key() {
        let spec = ControllerRequestSpec {
            host: "fake.server.com".into(),
            path: "/eidc/connected".into(),
            method: "POST".into(),
            server_key: String::new(),
            ..Default::default()
        };
        assert!(spec.build().is_err());
    }

    #[test]
    fn controller_request_spec_builds_northbound_request() {
        let spec = ControllerRequestSpec {
            host: "fake.server.com".into(),
            path: "/eidc/connected".into(),
            method: "POST".into(),
            server_key: "abc123".into(),
            body: Some(BodySpec::Raw(b"{}".to_vec())),
            ..Default::default()
        };
        let msg = spec.build().unwrap();
        assert_eq!(msg.direction(), Direction::Northbound);
        let req = msg.request.as_ref().unwrap();
        assert_eq!(req.headers.get("ServerKey"), Some("abc123"));
        assert_eq!(req.headers.get("Content-Type"), Some(APPLICATION_JSON));
    }

    #[test]
    fn controller_response_wrapper_upgrade() {
        let spec = ControllerResponseSpec {
            status: 200,
            wrapper: Some(SimpleResponse {
                cmd: "GETOUTBOUND".into(),
                result: true,
            }),
            body: Some(BodySpec::Raw(br#"{"siteKey":"ABC"}"#.to_vec())),
            ..Default::default()
        };
        let msg = spec.build().unwrap();
        assert_eq!(msg.msg_type(), MsgType::GetOutboundResponse);
        let wrapper = msg.parse_body_response().unwrap();
        assert_eq!(wrapper.cmd, "GETOUTBOUND");
        assert!(wrapper.result);
        assert_eq!(wrapper.body["siteKey"], "ABC");
    }

    #[test]
    fn controller_response_simple_wrapper_only() {
        let spec = ControllerResponseSpec {
            status: 200,
            wrapper: Some(SimpleResponse {
                cmd: "HEARTBEAT".into(),
                result: true,
            }),
            ..Default::default()
        };
        let msg = spec.build().unwrap();
        assert_eq!(msg.msg_type(), MsgType::HeartbeatResponse);
        let resp = msg.response.as_ref().unwrap();
        assert_eq!(resp.version_minor, 0);
        assert_eq!(resp.headers.get("Server"), Some(CONTROLLER_SERVER_NAME));
        assert_eq!(resp.headers.get("Cache-Control"), Some("no-cache"));
    }

    #[test]
    fn replace_header_value_rewrites_in_place() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let out = replace_header_value(b"Content-Length: ", b"999", raw).unwrap();
        assert_eq!(&out[..], b"POST /x HTTP/1.1\r\nContent-Length: 999\r\n\r\nhello");
    }

    #[test]
    fn replace_header_value_missing_header() {
        let raw = b"POST /x HTTP/1.1\r\n\r\n";
        assert!(replace_header_value(b"ServerKey: ", b"k", raw).is_err());
    }
}
