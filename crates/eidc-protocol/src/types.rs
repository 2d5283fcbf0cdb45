//! The closed set of message kinds the proxy understands.

use std::fmt;

/// Typed tag attached to every parsed [`crate::Message`].
///
/// Request/response pairs follow the manager's command vocabulary; the
/// three unpaired request kinds (`PointStatusRequest`, `EventRequest`)
/// are controller-initiated notifications that receive no command echo.
/// Anything the typer cannot place is `Unknown` and flows through the
/// proxy untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MsgType {
    #[default]
    Unknown,
    ConnectedRequest,
    ConnectedResponse,
    GetOutboundRequest,
    GetOutboundResponse,
    GetPointStatusRequest,
    GetPointStatusResponse,
    SetTimeRequest,
    SetTimeResponse,
    PointStatusRequest,
    EventRequest,
    DoorLockStatusRequest,
    DoorLockStatusResponse,
    EnableEventsRequest,
    EnableEventsResponse,
    EventAckRequest,
    EventAckResponse,
    HeartbeatRequest,
    HeartbeatResponse,
    SetWebUserRequest,
    SetWebUserResponse,
    SetOutboundRequest,
    SetOutboundResponse,
    ResetEventsRequest,
    ResetEventsResponse,
    ClearPointsRequest,
    ClearPointsResponse,
    AddPointsRequest,
    AddPointsResponse,
    ResetPointEngineRequest,
    ResetPointEngineResponse,
    AddFormatsRequest,
    AddFormatsResponse,
    AddPrivilegesRequest,
    AddPrivilegesResponse,
    AddCardsRequest,
    AddCardsResponse,
    SetConfigKeyRequest,
    SetConfigKeyResponse,
    SetDeviceIdRequest,
    SetDeviceIdResponse,
    ClearSchedulesRequest,
    ClearSchedulesResponse,
    ClearHolidaysRequest,
    ClearHolidaysResponse,
    AddSchedulesRequest,
    AddSchedulesResponse,
    ClearPrivilegesRequest,
    ClearPrivilegesResponse,
    ClearCardsRequest,
    ClearCardsResponse,
    DownloadRequest,
    DownloadResponse,
    ReflashRequest,
    ReflashResponse,
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MsgType::Unknown => "Unknown",
            MsgType::ConnectedRequest => "Connected Request",
            MsgType::ConnectedResponse => "Connected Response",
            MsgType::GetOutboundRequest => "Getoutbound Request",
            MsgType::GetOutboundResponse => "Getoutbound Response",
            MsgType::GetPointStatusRequest => "GetPointStatus Request",
            MsgType::GetPointStatusResponse => "GetPointStatus Response",
            MsgType::SetTimeRequest => "SetTime Request",
            MsgType::SetTimeResponse => "SetTime Response",
            MsgType::PointStatusRequest => "PointStatus Request",
            MsgType::EventRequest => "Event Request",
            MsgType::DoorLockStatusRequest => "Door/LockStatus Request",
            MsgType::DoorLockStatusResponse => "Door/LockStatus Response",
            MsgType::EnableEventsRequest => "EnableEvents Request",
            MsgType::EnableEventsResponse => "EnableEvents Response",
            MsgType::EventAckRequest => "EventAck Request",
            MsgType::EventAckResponse => "EventAck Response",
            MsgType::HeartbeatRequest => "Heartbeat Request",
            MsgType::HeartbeatResponse => "Heartbeat Response",
            MsgType::SetWebUserRequest => "SetWebUser Request",
            MsgType::SetWebUserResponse => "SetWebUser Response",
            MsgType::SetOutboundRequest => "SetOutbound Request",
            MsgType::SetOutboundResponse => "SetOutbound Response",
            MsgType::ResetEventsRequest => "ResetEvents Request",
            MsgType::ResetEventsResponse => "ResetEvents Response",
            MsgType::ClearPointsRequest => "ClearPoints Request",
            MsgType::ClearPointsResponse => "ClearPoints Response",
            MsgType::AddPointsRequest => "AddPoints Request",
            MsgType::AddPointsResponse => "AddPoints Response",
            MsgType::ResetPointEngineRequest => "ResetPointEngine Request",
            MsgType::ResetPointEngineResponse => "ResetPointEngine Response",
            MsgType::AddFormatsRequest => "AddFormats Request",
            MsgType::AddFormatsResponse => "AddFormats Response",
            MsgType::AddPrivilegesRequest => "AddPrivileges Request",
            MsgType::AddPrivilegesResponse => "AddPrivileges Response",
            MsgType::AddCardsRequest => "AddCards Request",
            MsgType::AddCardsResponse => "AddCards Response",
            MsgType::SetConfigKeyRequest => "SetConfigKey Request",
            MsgType::SetConfigKeyResponse => "SetConfigKey Response",
            MsgType::SetDeviceIdRequest => "SetDeviceID Request",
            MsgType::SetDeviceIdResponse => "SetDeviceID Response",
            MsgType::ClearSchedulesRequest => "ClearSchedules Request",
            MsgType::ClearSchedulesResponse => "ClearSchedules Response",
            MsgType::ClearHolidaysRequest => "ClearHolidays Request",
            MsgType::ClearHolidaysResponse => "ClearHolidays Response",
            MsgType::AddSchedulesRequest => "AddSchedules Request",
            MsgType::AddSchedulesResponse => "AddSchedules Response",
            MsgType::ClearPrivilegesRequest => "ClearPrivileges Request",
            MsgType::ClearPrivilegesResponse => "ClearPrivileges Response",
            MsgType::ClearCardsRequest => "ClearCards Request",
            MsgType::ClearCardsResponse => "ClearCards Response",
            MsgType::DownloadRequest => "Download Request",
            MsgType::DownloadResponse => "Download Response",
            MsgType::ReflashRequest => "Reflash Request",
            MsgType::ReflashResponse => "Reflash Response",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_protocol_spelling() {
        assert_eq!(MsgType::DoorLockStatusResponse.to_string(), "Door/LockStatus Response");
        assert_eq!(MsgType::GetOutboundRequest.to_string(), "Getoutbound Request");
        assert_eq!(MsgType::SetDeviceIdResponse.to_string(), "SetDeviceID Response");
    }

    #[test]
    fn default_is_unknown() {
        assert_eq!(MsgType::default(), MsgType::Unknown);
    }
}
