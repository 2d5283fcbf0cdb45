//! Northbound payloads: what the controller sends, and how its embedded
//! web server answers manager commands.
//!
//! The controller's command echo does not always match the manager's
//! request spelling. The manager says `setTime`; the controller answers
//! with `"cmd":"SETTIME"` inside a wrapper of one of three shapes:
//!
//! - simple: `{"result":true, "cmd":"SETTIME"}`
//! - body:   `{"cmd":"GETOUTBOUND","result":true,"body":{...}}`
//! - errors: `{"cmd":"...","result":false,"errors":[...]}`
//!
//! Typing decodes into a superset of all three and switches on `cmd`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtocolError;
use crate::event::EventType;
use crate::message::{Message, RequestHead, ResponseHead};
use crate::types::MsgType;
use crate::APPLICATION_JSON;

/// `POST`ed by the controller as the first request of every connection.
pub const CONNECTED_URI: &str = "/eidc/connected";
/// `POST`ed by the controller when point states change.
pub const POINT_STATUS_URI: &str = "/eidc/pointStatus";
/// `POST`ed by the controller for each live or buffered event.
pub const EVENT_URI: &str = "/eidc/event";

/// Body of the controller's login request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectedRequest {
    pub serial_number: String,
    pub firmware_version: String,
    pub ip_address: String,
    pub mac_address: String,
    pub site_key: String,
    pub configuration_key: String,
    pub card_format: String,
}

impl fmt::Display for ConnectedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Serial Number:     {}", self.serial_number)?;
        writeln!(f, "Firmware Version:  {}", self.firmware_version)?;
        writeln!(f, "IP Address:        {}", self.ip_address)?;
        writeln!(f, "MAC Address:       {}", self.mac_address)?;
        writeln!(f, "Site Key:          {}", self.site_key)?;
        writeln!(f, "Configuration Key: {}", self.configuration_key)?;
        writeln!(f, "Card Format:       {}", self.card_format)
    }
}

/// The controller's self-declaration captured before the session starts.
#[derive(Debug, Clone)]
pub struct LoginInfo {
    /// Value of the `Host` header: the manager the controller wants.
    pub host: String,
    /// Value of the `ServerKey` request header.
    pub server_key: String,
    /// Parsed login body.
    pub connected: ConnectedRequest,
}

impl LoginInfo {
    /// Extract login details from the first message of a connection.
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        let req = msg
            .request
            .as_ref()
            .ok_or_else(|| ProtocolError::NotLogin("not a request".into()))?;
        if req.method != "POST" || req.path() != CONNECTED_URI {
            return Err(ProtocolError::NotLogin(format!(
                "{} {}",
                req.method,
                req.path()
            )));
        }
        if msg.body.is_empty() {
            return Err(ProtocolError::NotLogin("empty login body".into()));
        }

        Ok(Self {
            host: req.host().unwrap_or_default().to_string(),
            server_key: req.headers.get("ServerKey").unwrap_or_default().to_string(),
            connected: serde_json::from_slice(&msg.body)?,
        })
    }
}

impl fmt::Display for LoginInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Host: {}", self.host)?;
        writeln!(f, "ServerKey: {}", self.server_key)?;
        write!(f, "{}", self.connected)
    }
}

/// Status of one controller point (input/output), as reported in a
/// [`PointStatusRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Point {
    pub point_id: i64,
    pub old_status: i64,
    pub new_status: i64,
}

/// Northbound point-status notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PointStatusRequest {
    pub time: String,
    pub points: Vec<Point>,
}

/// Northbound event notification (badge read, alarm, power, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventRequest {
    pub event_id: i64,
    pub event_type: EventType,
    pub time: i64,
    pub point_id: i64,
    pub new_status: i64,
    pub old_status: i64,
    pub trigger_id: i64,
    pub site_code: i64,
    pub card_code: i64,
    pub apb_zone_id: i64,
}

/// Controller response wrapper echoing the command plus a result flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleResponse {
    pub cmd: String,
    pub result: bool,
}

/// Wrapper variant carrying an additional JSON `body`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyResponse {
    pub cmd: String,
    pub result: bool,
    pub body: serde_json::Value,
}

/// Wrapper variant carrying an `errors` payload; `result` is false.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorsResponse {
    pub cmd: String,
    pub result: bool,
    pub errors: serde_json::Value,
}

/// Body of the controller's answer to `getoutbound`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetOutboundResponse {
    pub site_key: String,
    pub primary_host_address: String,
    pub primary_port: i64,
    pub secondary_host_address: String,
    pub secondary_port: i64,
    pub primary_ssl: i64,
    pub secondary_ssl: i64,
    pub retry_interval: i64,
    pub max_random_retry_interval: i64,
    pub enabled: i64,
}

/// Body of the controller's answer to `addFormats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddFormatsResponse {
    pub formats_added: i64,
}

/// Body of the controller's answer to `addCards`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddCardsResponse {
    pub cards_added: i64,
}

/// Body of the controller's answer to `door/lockstatus`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoorLockStatusResponse {
    pub status: String,
}

/// Body of the controller's answer to `download`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadResponse {
    pub file_size: i64,
}

// ---------------------------------------------------------------------------
// typing
// ---------------------------------------------------------------------------

/// Superset of the three controller response wrapper shapes, used only
/// to read `cmd` while tolerating whichever extra fields are present.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseEnvelope {
    cmd: String,
}

pub(crate) fn northbound_request_type(req: &RequestHead) -> MsgType {
    if req.method != "POST" {
        return MsgType::Unknown;
    }
    match req.path() {
        CONNECTED_URI => MsgType::ConnectedRequest,
        POINT_STATUS_URI => MsgType::PointStatusRequest,
        EVENT_URI => MsgType::EventRequest,
        _ => MsgType::Unknown,
    }
}

pub(crate) fn northbound_response_type(resp: &ResponseHead, body: &[u8]) -> MsgType {
    if resp.status != 200 {
        return MsgType::Unknown;
    }
    if resp.headers.get("Content-Type") != Some(APPLICATION_JSON) {
        return MsgType::Unknown;
    }
    let Ok(envelope) = serde_json::from_slice::<ResponseEnvelope>(body) else {
        return MsgType::Unknown;
    };

    match envelope.cmd.as_str() {
        "DOOR/LOCKSTATUS" => MsgType::DoorLockStatusResponse,
        "ENABLEEVENTS" => MsgType::EnableEventsResponse,
        "EVENTACK" => MsgType::EventAckResponse,
        "GETOUTBOUND" => MsgType::GetOutboundResponse,
        "GETPOINTSTATUS" => MsgType::GetPointStatusResponse,
        "HEARTBEAT" => MsgType::HeartbeatResponse,
        "SETTIME" => MsgType::SetTimeResponse,
        "SETWEBUSER" => MsgType::SetWebUserResponse,
        "SETOUTBOUND" => MsgType::SetOutboundResponse,
        "RESETEVENTS" => MsgType::ResetEventsResponse,
        "CLEARPOINTS" => MsgType::ClearPointsResponse,
        "RESETPOINTENGINE" => MsgType::ResetPointEngineResponse,
        "ADDFORMATS" => MsgType::AddFormatsResponse,
        "CLEARSCHEDULES" => MsgType::ClearSchedulesResponse,
        "ADDSCHEDULES" => MsgType::AddSchedulesResponse,
        "CLEARPRIVILEGES" => MsgType::ClearPrivilegesResponse,
        "ADDPRIVILEGES" => MsgType::AddPrivilegesResponse,
        "CLEARCARDS" => MsgType::ClearCardsResponse,
        "SETCONFIGKEY" => MsgType::SetConfigKeyResponse,
        "CLEARHOLIDAYS" => MsgType::ClearHolidaysResponse,
        "DOWNLOAD" => MsgType::DownloadResponse,
        "REFLASH" => MsgType::ReflashResponse,
        "SETDEVICEID" => MsgType::SetDeviceIdResponse,
        "ADDCARDS" => MsgType::AddCardsResponse,
        "ADDPOINTS" => MsgType::AddPointsResponse,
        _ => MsgType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// body accessors
// ---------------------------------------------------------------------------

impl Message {
    pub fn parse_connected_request(&self) -> Result<ConnectedRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_point_status_request(&self) -> Result<PointStatusRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_event_request(&self) -> Result<EventRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_simple_response(&self) -> Result<SimpleResponse, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_body_response(&self) -> Result<BodyResponse, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_get_outbound_response(&self) -> Result<GetOutboundResponse, ProtocolError> {
        let wrapper = self.parse_body_response()?;
        Ok(serde_json::from_value(wrapper.body)?)
    }

    pub fn parse_door_lock_status_response(&self) -> Result<DoorLockStatusResponse, ProtocolError> {
        let wrapper = self.parse_body_response()?;
        Ok(serde_json::from_value(wrapper.body)?)
    }

    pub fn parse_add_formats_response(&self) -> Result<AddFormatsResponse, ProtocolError> {
        let wrapper = self.parse_body_response()?;
        Ok(serde_json::from_value(wrapper.body)?)
    }

    pub fn parse_add_cards_response(&self) -> Result<AddCardsResponse, ProtocolError> {
        let wrapper = self.parse_body_response()?;
        Ok(serde_json::from_value(wrapper.body)?)
    }

    /// Result bit of an `ENABLEEVENTS` echo; rejects other commands.
    pub fn parse_enable_events_response(&self) -> Result<bool, ProtocolError> {
        let simple = self.parse_simple_response()?;
        if simple.cmd != "ENABLEEVENTS" {
            return Err(ProtocolError::UnexpectedCmd {
                expected: "ENABLEEVENTS".into(),
                got: simple.cmd,
            });
        }
        Ok(simple.result)
    }

    /// Result bit of a `SETTIME` echo; rejects other commands.
    pub fn parse_set_time_response(&self) -> Result<bool, ProtocolError> {
        let simple = self.parse_simple_response()?;
        if simple.cmd != "SETTIME" {
            return Err(ProtocolError::UnexpectedCmd {
                expected: "SETTIME".into(),
                got: simple.cmd,
            });
        }
        Ok(simple.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_wire::Direction;

    const LOGIN_BODY: &str = "{\"serialNumber\":\"0127F01A\",\"firmwareVersion\":\"3.4.20\",\
        \"ipAddress\":\"192.168.6.40\",\"macAddress\":\"00:14:E4:01:7F:1A\",\
        \"siteKey\":\"ABC123\",\"configurationKey\":\"DEF456\",\"cardFormat\":\"26bitWiegand\"}";

    fn login_wire() -> Vec<u8> {
        let mut wire = format!(
            "POST /eidc/connected HTTP/1.1\r\nHost: fake.server.com\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\
             ServerKey: 9c6e4f9330f54e4b\r\n\r\n",
            LOGIN_BODY.len()
        )
        .into_bytes();
        wire.extend_from_slice(LOGIN_BODY.as_bytes());
        wire
    }

    #[test]
    fn connected_request_is_typed_and_parsed() {
        let msg = Message::parse(login_wire(), Direction::Northbound).unwrap();
        assert_eq!(msg.msg_type(), MsgType::ConnectedRequest);
        let body = msg.parse_connected_request().unwrap();
        assert_eq!(body.serial_number, "0127F01A");
        assert_eq!(body.firmware_version, "3.4.20");
        assert_eq!(body.ip_address, "192.168.6.40");
        assert_eq!(body.mac_address, "00:14:E4:01:7F:1A");
        assert_eq!(body.site_key, "ABC123");
        assert_eq!(body.configuration_key, "DEF456");
        assert_eq!(body.card_format, "26bitWiegand");
    }

    #[test]
    fn login_info_extraction() {
        let msg = Message::parse(login_wire(), Direction::Northbound).unwrap();
        let login = LoginInfo::from_message(&msg).unwrap();
        assert_eq!(login.host, "fake.server.com");
        assert_eq!(login.server_key, "9c6e4f9330f54e4b");
        assert_eq!(login.connected.site_key, "ABC123");
    }

    #[test]
    fn login_rejects_non_connected_request() {
        let wire = b"POST /eidc/event HTTP/1.1\r\nHost: h\r\nContent-Length: 2\r\n\r\n{}";
        let msg = Message::parse(&wire[..], Direction::Northbound).unwrap();
        assert!(LoginInfo::from_message(&msg).is_err());
    }

    #[test]
    fn simple_response_typing_via_cmd() {
        let body = "{\"result\":true, \"cmd\":\"HEARTBEAT\"}";
        let wire = format!(
            "HTTP/1.0 200 OK\r\nServer: eIDC32 WebServer\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nCache-Control: no-cache\r\n\r\n{}",
            body.len(),
            body
        );
        let msg = Message::parse(wire.into_bytes(), Direction::Northbound).unwrap();
        assert_eq!(msg.msg_type(), MsgType::HeartbeatResponse);
    }

    #[test]
    fn body_response_typing_and_unwrap() {
        let body = "{\"cmd\":\"GETOUTBOUND\",\"result\":true,\"body\":{\"siteKey\":\"ABC\",\
            \"primaryHostAddress\":\"fake.server.com\",\"primaryPort\":18800,\"primarySsl\":1}}";
        let wire = format!(
            "HTTP/1.0 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let msg = Message::parse(wire.into_bytes(), Direction::Northbound).unwrap();
        assert_eq!(msg.msg_type(), MsgType::GetOutboundResponse);
        let out = msg.parse_get_outbound_response().unwrap();
        assert_eq!(out.primary_host_address, "fake.server.com");
        assert_eq!(out.primary_port, 18800);
        // Fields absent from the body default.
        assert_eq!(out.retry_interval, 0);
    }

    #[test]
    fn non_json_response_is_unknown() {
        let wire = b"HTTP/1.0 200 OK\r\nContent-Type: text/html\r\nContent-Length: 4\r\n\r\nhtml";
        let msg = Message::parse(&wire[..], Direction::Northbound).unwrap();
        assert_eq!(msg.msg_type(), MsgType::Unknown);
    }

    #[test]
    fn unknown_cmd_is_unknown_type() {
        let body = "{\"cmd\":\"FILETEST\",\"result\":true}";
        let wire = format!(
            "HTTP/1.0 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let msg = Message::parse(wire.into_bytes(), Direction::Northbound).unwrap();
        assert_eq!(msg.msg_type(), MsgType::Unknown);
    }

    #[test]
    fn enable_events_response_checks_cmd() {
        let body = "{\"result\":true, \"cmd\":\"ENABLEEVENTS\"}";
        let wire = format!(
            "HTTP/1.0 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let msg = Message::parse(wire.into_bytes(), Direction::Northbound).unwrap();
        assert!(msg.parse_enable_events_response().unwrap());

        let wrong = "{\"result\":true, \"cmd\":\"HEARTBEAT\"}";
        let wire = format!(
            "HTTP/1.0 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            wrong.len(),
            wrong
        );
        let msg = Message::parse(wire.into_bytes(), Direction::Northbound).unwrap();
        assert!(msg.parse_enable_events_response().is_err());
    }
}
