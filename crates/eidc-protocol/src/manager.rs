//! Southbound payloads: the manager's command vocabulary toward the
//! controller, and southbound typing.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::message::{Message, RequestHead, ResponseHead};
use crate::types::MsgType;
use crate::APPLICATION_JSON;

// Southbound command URIs. `GET` commands carry no body (and arrive with
// the listener's stray trailing newline); `POST` commands carry JSON.
pub const HEARTBEAT_URI: &str = "/eidc/heartbeat";
pub const GET_OUTBOUND_URI: &str = "/eidc/getoutbound";
pub const ENABLE_EVENTS_URI: &str = "/eidc/enableevents";
pub const SET_TIME_URI: &str = "/eidc/setTime";
pub const SET_WEB_USER_URI: &str = "/eidc/setwebuser";
pub const GET_POINT_STATUS_URI: &str = "/eidc/getPointStatus";
pub const EVENT_ACK_URI: &str = "/eidc/eventack";
pub const DOOR_LOCK_STATUS_URI: &str = "/eidc/door/lockstatus";
pub const RESET_EVENTS_URI: &str = "/eidc/resetevents";
pub const CLEAR_POINTS_URI: &str = "/eidc/clearPoints";
pub const ADD_POINTS_URI: &str = "/eidc/addPoints";
pub const RESET_POINT_ENGINE_URI: &str = "/eidc/resetPointEngine";
pub const CLEAR_FORMATS_URI: &str = "/eidc/clearformats";
pub const ADD_FORMATS_URI: &str = "/eidc/addFormats";
pub const CLEAR_SCHEDULES_URI: &str = "/eidc/clearSchedules";
pub const CLEAR_HOLIDAYS_URI: &str = "/eidc/clearHolidays";
pub const ADD_SCHEDULES_URI: &str = "/eidc/addSchedules";
pub const CLEAR_PRIVILEGES_URI: &str = "/eidc/clearPrivileges";
pub const ADD_PRIVILEGES_URI: &str = "/eidc/addPrivileges";
pub const CLEAR_CARDS_URI: &str = "/eidc/clearCards";
pub const ADD_CARDS_URI: &str = "/eidc/addCards";
pub const SET_CONFIG_KEY_URI: &str = "/eidc/setConfigKey";
pub const SET_DEVICE_ID_URI: &str = "/eidc/setDeviceID";
pub const SET_OUTBOUND_URI: &str = "/eidc/setoutbound";
pub const DOWNLOAD_URI: &str = "/eidc/download";
pub const REFLASH_URI: &str = "/eidc/reflash";

/// Query parameter carrying the manager's API username.
pub const QUERY_USERNAME: &str = "username";
/// Query parameter carrying the manager's API password.
pub const QUERY_PASSWORD: &str = "password";
/// Query parameter carrying the command sequence number.
pub const QUERY_SEQ: &str = "seq";

/// Manager's answer to the controller's `POST /eidc/connected`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectedResponse {
    pub server_key: String,
}

/// `POST /eidc/setTime` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetTimeRequest {
    pub time: String,
    // The manager really does spell it this way on the wire.
    #[serde(rename = "dstObservence")]
    pub dst_observance: String,
    #[serde(rename = "dstStart")]
    pub dst_start: SetTimeDstData,
    #[serde(rename = "dstEnd")]
    pub dst_end: SetTimeDstData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetTimeDstData {
    pub month: i64,
    pub week_in_month: i64,
    pub day_of_week: i64,
    pub hour: i64,
    pub minute: i64,
}

/// `POST /eidc/setwebuser` body. Field names are capitalised on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetWebUserRequest {
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "Password")]
    pub password: String,
}

/// `POST /eidc/getPointStatus` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetPointStatusRequest {
    pub point_ids: Vec<i64>,
}

/// `POST /eidc/eventack` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventAckRequest {
    pub event_ids: Vec<i64>,
}

/// `POST /eidc/door/lockstatus` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorLockStatusRequest {
    pub status: String,
    pub duration: i64,
}

/// `POST /eidc/addPoints` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddPointsRequest {
    #[serde(rename = "Points")]
    pub points: Vec<NewPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPoint {
    #[serde(rename = "Type")]
    pub point_type: String,
    #[serde(rename = "Index")]
    pub index: i64,
    #[serde(rename = "RecordInfo")]
    pub record_info: i64,
    #[serde(rename = "DeviceId")]
    pub device_id: i64,
    #[serde(rename = "PointId")]
    pub point_id: i64,
    #[serde(rename = "PointRefNo")]
    pub point_ref_no: i64,
    #[serde(rename = "PointDriver")]
    pub point_driver: i64,
    #[serde(rename = "IPointFlag")]
    pub i_point_flag: i64,
    #[serde(rename = "IPointStatus")]
    pub i_point_status: i64,
    #[serde(rename = "IPointTick")]
    pub i_point_tick: i64,
}

/// `POST /eidc/addSchedules` body. Never observed with content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddSchedulesRequest {
    #[serde(rename = "Schedules")]
    pub schedules: Vec<serde_json::Value>,
}

/// `POST /eidc/addPrivileges` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddPrivilegesRequest {
    #[serde(rename = "StartIndex")]
    pub start_index: i64,
    #[serde(rename = "Privileges")]
    pub privileges: Vec<NewPrivilege>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPrivilege {
    #[serde(rename = "ScheduleIds")]
    pub schedule_ids: Vec<i64>,
    #[serde(rename = "FloorMask")]
    pub floor_mask: Vec<i64>,
    #[serde(rename = "Description")]
    pub description: String,
}

/// `POST /eidc/addCards` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddCardsRequest {
    #[serde(rename = "CardHolders")]
    pub card_holders: Vec<CardHolder>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CardHolder {
    #[serde(rename = "PinCode")]
    pub pin_code: String,
    #[serde(rename = "SiteCode")]
    pub site_code: i64,
    #[serde(rename = "CardCode")]
    pub card_code: i64,
    #[serde(rename = "StrCardCode")]
    pub str_card_code: String,
    #[serde(rename = "ActivationDate")]
    pub activation_date: String,
    #[serde(rename = "ExpirationDate")]
    pub expiration_date: String,
    #[serde(rename = "InGroup")]
    pub in_group: i64,
    #[serde(rename = "OutGroup")]
    pub out_group: i64,
    #[serde(rename = "FirstIn")]
    pub first_in: i64,
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Description")]
    pub description: String,
}

/// `POST /eidc/setConfigKey` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetConfigKeyRequest {
    #[serde(rename = "ConfigurationKey")]
    pub configuration_key: String,
}

/// `POST /eidc/setDeviceID` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetDeviceIdRequest {
    #[serde(rename = "deviceID")]
    pub device_id: i64,
}

/// `POST /eidc/setoutbound` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetOutboundRequest {
    pub site_key: String,
    pub primary_host_address: String,
    pub primary_port: i64,
    pub secondary_host_address: String,
    pub secondary_port: i64,
    pub primary_ssl: i64,
    pub secondary_ssl: i64,
    pub retry_interval: i64,
    pub max_random_retry_interval: i64,
}

// ---------------------------------------------------------------------------
// typing
// ---------------------------------------------------------------------------

pub(crate) fn southbound_request_type(req: &RequestHead) -> MsgType {
    match req.method.as_str() {
        "GET" => match req.path() {
            HEARTBEAT_URI => MsgType::HeartbeatRequest,
            GET_OUTBOUND_URI => MsgType::GetOutboundRequest,
            ENABLE_EVENTS_URI => MsgType::EnableEventsRequest,
            RESET_EVENTS_URI => MsgType::ResetEventsRequest,
            // clearformats has no tag of its own in the controller's
            // command echo; it rides the clearPoints tag.
            CLEAR_POINTS_URI | CLEAR_FORMATS_URI => MsgType::ClearPointsRequest,
            RESET_POINT_ENGINE_URI => MsgType::ResetPointEngineRequest,
            CLEAR_SCHEDULES_URI => MsgType::ClearSchedulesRequest,
            CLEAR_HOLIDAYS_URI => MsgType::ClearHolidaysRequest,
            CLEAR_PRIVILEGES_URI => MsgType::ClearPrivilegesRequest,
            CLEAR_CARDS_URI => MsgType::ClearCardsRequest,
            REFLASH_URI => MsgType::ReflashRequest,
            _ => MsgType::Unknown,
        },
        "POST" => match req.path() {
            SET_TIME_URI => MsgType::SetTimeRequest,
            SET_WEB_USER_URI => MsgType::SetWebUserRequest,
            GET_POINT_STATUS_URI => MsgType::GetPointStatusRequest,
            EVENT_ACK_URI => MsgType::EventAckRequest,
            DOOR_LOCK_STATUS_URI => MsgType::DoorLockStatusRequest,
            SET_OUTBOUND_URI => MsgType::SetOutboundRequest,
            ADD_POINTS_URI => MsgType::AddPointsRequest,
            ADD_FORMATS_URI => MsgType::AddFormatsRequest,
            ADD_PRIVILEGES_URI => MsgType::AddPrivilegesRequest,
            ADD_CARDS_URI => MsgType::AddCardsRequest,
            SET_CONFIG_KEY_URI => MsgType::SetConfigKeyRequest,
            SET_DEVICE_ID_URI => MsgType::SetDeviceIdRequest,
            ADD_SCHEDULES_URI => MsgType::AddSchedulesRequest,
            DOWNLOAD_URI => MsgType::DownloadRequest,
            _ => MsgType::Unknown,
        },
        _ => MsgType::Unknown,
    }
}

/// The only southbound response the proxy types is the manager's answer
/// to the controller login, recognised by its non-empty `serverKey`.
pub(crate) fn southbound_response_type(resp: &ResponseHead, body: &[u8]) -> MsgType {
    if resp.status != 200 {
        return MsgType::Unknown;
    }
    if resp.headers.get("Content-Type") != Some(APPLICATION_JSON) {
        return MsgType::Unknown;
    }
    match serde_json::from_slice::<ConnectedResponse>(body) {
        Ok(parsed) if !parsed.server_key.is_empty() => MsgType::ConnectedResponse,
        _ => MsgType::Unknown,
    }
}

// ---------------------------------------------------------------------------
// body accessors
// ---------------------------------------------------------------------------

impl Message {
    pub fn parse_connected_response(&self) -> Result<ConnectedResponse, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_set_time_request(&self) -> Result<SetTimeRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_set_web_user_request(&self) -> Result<SetWebUserRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_get_point_status_request(&self) -> Result<GetPointStatusRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_event_ack_request(&self) -> Result<EventAckRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_door_lock_status_request(&self) -> Result<DoorLockStatusRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_set_outbound_request(&self) -> Result<SetOutboundRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_add_points_request(&self) -> Result<AddPointsRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn parse_add_cards_request(&self) -> Result<AddCardsRequest, ProtocolError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Firmware images are opaque; the body is handed over as-is.
    pub fn download_payload(&self) -> &[u8] {
        &self.body
    }
}
