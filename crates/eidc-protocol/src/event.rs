//! The controller's 16-bit event-type space.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Event type carried in a northbound event notification.
///
/// The high bit marks a buffered (replayed) event; the remaining bits
/// identify the event itself. [`fmt::Display`] renders buffered events in
/// parentheses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventType(pub u16);

/// AND-ed with an event value to indicate a buffered rather than live event.
pub const BUFFERED_EVENT_FLAG: EventType = EventType(0x8000);

impl EventType {
    /// Matches any event type when used as a filter.
    pub const ANY: EventType = EventType(0);

    pub const DEVICE_STARTUP: EventType = EventType(1);
    pub const REFLASH_SUCCESSFUL: EventType = EventType(2);
    pub const REFLASH_FAILED: EventType = EventType(3);
    pub const ERROR: EventType = EventType(4);
    pub const EVENT_BUFFER_OVERFLOW: EventType = EventType(5);
    pub const DEVICE_COMMUNICATION_ESTABLISH: EventType = EventType(6);
    pub const DEVICE_COMMUNICATION_LOST: EventType = EventType(7);
    pub const POWER_NORMAL: EventType = EventType(8);
    pub const POWER_LOST: EventType = EventType(9);
    pub const BATTERY_NORMAL: EventType = EventType(10);
    pub const BATTERY_LOST: EventType = EventType(11);
    pub const DOWNLOAD_SUCCESS: EventType = EventType(12);
    pub const DOWNLOAD_ERROR: EventType = EventType(13);
    pub const TAMPER_ABNORMAL: EventType = EventType(14);
    pub const TAMPER_NORMAL: EventType = EventType(15);
    pub const SUPERVISION_ABNORMAL: EventType = EventType(16);
    pub const SUPERVISION_NORMAL: EventType = EventType(17);
    pub const INPUT_BYPASSED: EventType = EventType(33);
    pub const INPUT_UNBYPASSED: EventType = EventType(34);
    pub const INPUT_INACTIVITY_REPORT: EventType = EventType(35);
    pub const OUTPUT_OVERRIDDEN: EventType = EventType(36);
    pub const OUTPUT_UNOVERRIDDEN: EventType = EventType(37);
    pub const UNRECOGNIZED_CARD_FORMAT: EventType = EventType(48);
    pub const READER_SERVICE_UNDEFINED: EventType = EventType(49);
    pub const AUTHENTICATION_UNKNOWN_CARD: EventType = EventType(50);
    pub const AUTHENTICATION_CARD_OUTDATED: EventType = EventType(51);
    pub const AUTHENTICATION_CARD_NOT_YET_ACTIVE: EventType = EventType(52);
    pub const AUTHENTICATION_CARD_EXPIRED: EventType = EventType(53);
    pub const AUTHENTICATION_CARD_BLOCKED: EventType = EventType(54);
    pub const AUTHENTICATION_PIN_MISMATCH: EventType = EventType(55);
    pub const AUTHENTICATION_TOO_MANY_RETRIES: EventType = EventType(56);
    pub const AUTHENTICATION_GROUP_NOT_DEFINED: EventType = EventType(57);
    pub const AUTHENTICATION_DOUBLE_TAP: EventType = EventType(58);
    pub const ACCESS_GRANTED: EventType = EventType(64);
    pub const ACCESS_DENIED_INSUFFICIENT_PRIVILEGES: EventType = EventType(65);
    pub const ACCESS_DENIED_OUT_OF_PRIVILEGE_SCHEDULE: EventType = EventType(66);
    pub const ACCESS_DENIED_CONDITION_NOT_MET: EventType = EventType(67);
    pub const ACCESS_DENIED_PRIORITY_TRIGGER_ACTIVE: EventType = EventType(68);
    pub const ACCESS_DENIED_PASSBACK_VIOLATION: EventType = EventType(69);
    pub const ACCESS_RESTRICTED: EventType = EventType(70);
    pub const ACCESS_EVENT_PASSBACK_VIOLATION: EventType = EventType(71);
    pub const ACCESS_EVENT_DOOR_OPEN_TOO_LONG: EventType = EventType(72);
    pub const ALARM_IN_ALARM: EventType = EventType(80);
    pub const ALARM_ARMED: EventType = EventType(81);
    pub const ALARM_DISARMED: EventType = EventType(82);
    pub const ALARM_RESTORED: EventType = EventType(83);
    pub const ARMING_ARMED: EventType = EventType(88);
    pub const ARMING_ARM_FAILED_INSUFFICIENT_PRIVILEGES: EventType = EventType(89);
    pub const ARMING_ARM_FAILED_OUT_OF_PRIVILEGE_SCHEDULE: EventType = EventType(90);
    pub const ARMING_ARM_FAILED_CONDITION_NOT_MET: EventType = EventType(91);
    pub const ARMING_ARM_FAILED_PRIORITY_TRIGGER_ACTIVE: EventType = EventType(92);
    pub const ARMING_DISARMED: EventType = EventType(93);
    pub const SERVICE_ACTIVATED: EventType = EventType(96);
    pub const SERVICE_ACTIVATION_FAILED_CONDITION_NOT_MET: EventType = EventType(97);
    pub const SERVICE_ACTIVATION_FAILED_PRIORITY_TRIGGER_ACTIVE: EventType = EventType(98);
    pub const SERVICE_DEACTIVATED: EventType = EventType(99);
    pub const ELEVATOR_ACCESS_GRANTED: EventType = EventType(104);
    pub const ELEVATOR_ACCESS_DENIED_INSUFFICIENT_PRIVILEGES: EventType = EventType(105);
    pub const ELEVATOR_ACCESS_DENIED_OUT_OF_PRIVILEGE_SCHEDULE: EventType = EventType(106);
    pub const ELEVATOR_ACCESS_DENIED_CONDITION_NOT_MET: EventType = EventType(107);
    pub const ELEVATOR_ACCESS_DENIED_PRIORITY_TRIGGER_ACTIVE: EventType = EventType(108);
    pub const ELEVATOR_ACCESS_RESTRICTED: EventType = EventType(109);
    pub const LOW_VOLTAGE: EventType = EventType(117);
    pub const VOLTAGE_NORMAL: EventType = EventType(118);
    pub const DC1_POWER_TROUBLE: EventType = EventType(122);
    pub const DC2_POWER_TROUBLE: EventType = EventType(123);
    pub const DC1_POWER_RESTORED: EventType = EventType(124);
    pub const DC2_POWER_RESTORED: EventType = EventType(125);
    pub const REBOOT: EventType = EventType(128);
    pub const STARTED: EventType = EventType(129);
    pub const SET_NETWORK_INFO: EventType = EventType(130);
    pub const REFLASH_FIRMWARE: EventType = EventType(131);
    pub const CONNECTION_START: EventType = EventType(144);
    pub const CONNECTION_START_DNS: EventType = EventType(145);
    pub const CONNECTION_HAVE_IP: EventType = EventType(146);
    pub const CONNECTION_CONNECTED: EventType = EventType(147);
    pub const CONNECTION_DISCONNECTED: EventType = EventType(148);
    pub const CONNECTION_FAILED: EventType = EventType(149);
    pub const CONNECTION_START_SSL: EventType = EventType(150);
    pub const CONNECTION_NO_DNS_SERVER: EventType = EventType(151);

    /// True when the buffered-event bit is set.
    pub fn is_buffered(self) -> bool {
        self.0 & BUFFERED_EVENT_FLAG.0 != 0
    }

    /// The event with the buffered bit cleared.
    pub fn without_buffered_flag(self) -> EventType {
        EventType(self.0 & !BUFFERED_EVENT_FLAG.0)
    }
}

impl From<u16> for EventType {
    fn from(value: u16) -> Self {
        EventType(value)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.without_buffered_flag().0 {
            1 => "DeviceStartup",
            2 => "ReflashSuccessful",
            3 => "ReflashFailed",
            4 => "Error",
            5 => "EventBufferOverflow",
            6 => "DeviceCommunicationEstablish",
            7 => "DeviceCommunicationLost",
            8 => "PowerNormal",
            9 => "PowerLost",
            10 => "BatteryNormal",
            11 => "BatteryLost",
            12 => "DownloadSuccess",
            13 => "DownloadError",
            14 => "TamperAbnormal",
            15 => "TamperNormal",
            16 => "SupervisionAbnormal",
            17 => "SupervisionNormal",
            33 => "InputBypassed",
            34 => "InputUnBypassed",
            35 => "InputInactivityReport",
            36 => "OutputOverridden",
            37 => "OutputUnOverridden",
            48 => "UnrecognizedCardFormat",
            49 => "ReaderServiceUndefined",
            50 => "Authentication_UnknownCard",
            51 => "Authentication_CardOutdated",
            52 => "Authentication_CardNotYetActive",
            53 => "Authentication_CardExpired",
            54 => "Authentication_CardBlocked",
            55 => "Authentication_PINMismatch",
            56 => "Authentication_TooManyRetries",
            57 => "Authentication_GroupNotDefined",
            58 => "Authentication_DoubleTap",
            64 => "AccessGranted",
            65 => "AccessDenied_InsufficientPrivileges",
            66 => "AccessDenied_OutOfPrivilegeSchedule",
            67 => "AccessDenied_ConditionNotMet",
            68 => "AccessDenied_PriorityTriggerActive",
            69 => "AccessDenied_PassbackViolation",
            70 => "AccessRestricted",
            71 => "AccessEvent_PassbackViolation",
            72 => "AccessEvent_DoorOpenTooLong",
            80 => "Alarm_InAlarm",
            81 => "Alarm_Armed",
            82 => "Alarm_Disarmed",
            83 => "Alarm_Restored",
            88 => "Arming_Armed",
            89 => "Arming_ArmFailed_InsufficientPrivileges",
            90 => "Arming_ArmFailed_OutOfPrivilegeSchedule",
            91 => "Arming_ArmFailed_ConditionNotMet",
            92 => "Arming_ArmFailed_PriorityTriggerActive",
            93 => "Arming_Disarmed",
            96 => "ServiceActivated",
            97 => "ServiceActivationFailed_ConditionNotMet",
            98 => "ServiceActivationFailed_PriorityTriggerActive",
            99 => "ServiceDeactivated",
            104 => "ElevatorAccessGranted",
            105 => "ElevatorAccessDenied_InsufficientPrivileges",
            106 => "ElevatorAccessDenied_OutOfPrivilegeSchedule",
            107 => "ElevatorAccessDenied_ConditionNotMet",
            108 => "ElevatorAccessDenied_PriorityTriggerActive",
            109 => "ElevatorAccessRestricted",
            117 => "LOW_VOLTAGE",
            118 => "VOLTAGE_NORMAL",
            122 => "DC1_POWER_TROUBLE",
            123 => "DC2_POWER_TROUBLE",
            124 => "DC1_POWER_RESTORED",
            125 => "DC2_POWER_RESTORED",
            128 => "Reboot",
            129 => "Started",
            130 => "SetNetworkInfo",
            131 => "ReflashFirmware",
            144 => "CONNECTION_START",
            145 => "CONNECTION_START_DNS",
            146 => "CONNECTION_HAVE_IP",
            147 => "CONNECTION_CONNECTED",
            148 => "CONNECTION_DISCONNECTED",
            149 => "CONNECTION_FAILED",
            150 => "CONNECTION_START_SSL",
            151 => "CONNECTION_NO_DNS_SERVER",
            _ => "Unknown_Event_Type",
        };
        if self.is_buffered() {
            write!(f, "({name})")
        } else {
            f.write_str(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_and_buffered_rendering() {
        assert_eq!(EventType(50).to_string(), "Authentication_UnknownCard");
        assert_eq!(EventType(32818).to_string(), "(Authentication_UnknownCard)");
        assert_eq!(EventType(0).to_string(), "Unknown_Event_Type");
        assert_eq!(EventType(32768).to_string(), "(Unknown_Event_Type)");
    }

    #[test]
    fn buffered_flag_helpers() {
        let buffered = EventType(EventType::ACCESS_GRANTED.0 | BUFFERED_EVENT_FLAG.0);
        assert!(buffered.is_buffered());
        assert_eq!(buffered.without_buffered_flag(), EventType::ACCESS_GRANTED);
        assert!(!EventType::ACCESS_GRANTED.is_buffered());
    }

    #[test]
    fn json_representation_is_a_bare_number() {
        let event = EventType::ACCESS_GRANTED;
        assert_eq!(serde_json::to_string(&event).unwrap(), "64");
        let back: EventType = serde_json::from_str("32832").unwrap();
        assert_eq!(back.without_buffered_flag(), EventType::ACCESS_GRANTED);
        assert!(back.is_buffered());
    }
}
