//! Live session context extracted from a fixed set of message types.

use std::collections::HashMap;
use std::sync::Mutex;

use eidc_protocol::controller::{GetOutboundResponse, Point};
use eidc_protocol::manager::{QUERY_PASSWORD, QUERY_USERNAME};
use eidc_protocol::{Message, MsgType, ProtocolError};

use crate::error::SessionError;

/// A username/password pair (manager API, controller web UI, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// State the session accumulates by watching traffic. Transformers read
/// it to build credible synthetic messages.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Append-only history of server keys; the tail is authoritative.
    /// Seeded with the login-time key at session construction.
    pub server_keys: Vec<String>,
    /// Manager API credentials, captured from `getoutbound` query params.
    pub api_creds: Credentials,
    /// Controller web-UI credentials, captured from `setwebuser`.
    pub web_creds: Credentials,
    /// Last observed `getoutbound` response body.
    pub get_outbound: Option<GetOutboundResponse>,
    /// Result bit of the last `enableevents` echo.
    pub events_enabled: bool,
    /// Latest status per point id.
    pub point_status: HashMap<i64, Point>,
    /// Number of heartbeat responses observed.
    pub heartbeats: u32,
}

/// Fold one message into the session state. Messages outside the watched
/// set pass through untouched.
pub(crate) fn update(state: &Mutex<SessionState>, msg: &Message) -> Result<(), SessionError> {
    match msg.msg_type() {
        MsgType::ConnectedResponse => {
            let parsed = msg.parse_connected_response().map_err(parse_err)?;
            let mut state = state.lock().unwrap();
            if state.server_keys.last() != Some(&parsed.server_key) {
                state.server_keys.push(parsed.server_key);
            }
        }
        MsgType::GetOutboundRequest => {
            let Some(req) = msg.request.as_ref() else {
                return Ok(());
            };
            let creds = Credentials {
                username: req.query_param(QUERY_USERNAME).unwrap_or_default(),
                password: req.query_param(QUERY_PASSWORD).unwrap_or_default(),
            };
            state.lock().unwrap().api_creds = creds;
        }
        MsgType::GetOutboundResponse => {
            let parsed = msg.parse_get_outbound_response().map_err(parse_err)?;
            state.lock().unwrap().get_outbound = Some(parsed);
        }
        MsgType::SetWebUserRequest => {
            let parsed = msg.parse_set_web_user_request().map_err(parse_err)?;
            state.lock().unwrap().web_creds = Credentials {
                username: parsed.user,
                password: parsed.password,
            };
        }
        MsgType::EnableEventsResponse => {
            let enabled = msg.parse_enable_events_response().map_err(parse_err)?;
            state.lock().unwrap().events_enabled = enabled;
        }
        MsgType::PointStatusRequest => {
            let parsed = msg.parse_point_status_request().map_err(parse_err)?;
            let mut state = state.lock().unwrap();
            for point in parsed.points {
                state.point_status.insert(point.point_id, point);
            }
        }
        MsgType::HeartbeatResponse => {
            state.lock().unwrap().heartbeats += 1;
        }
        _ => {}
    }
    Ok(())
}

fn parse_err(err: ProtocolError) -> SessionError {
    SessionError::Parse {
        message: err.to_string(),
    }
}
