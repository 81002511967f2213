//! Device-agnostic data model shared by every stage of the pipeline:
//! decoders emit `IntermediateForm`, the normalizer turns that into
//! `NormalizedEvent`, and the shadow cache stores the live projection of
//! both in `TelemetryEntry`/`MetadataEntry`.
//!
//! Kept deliberately free of any FamilyB/FamilyJ wire detail: once a frame
//! has been decoded into an `IntermediateForm`, nothing downstream may
//! inspect which family produced it except the command builder, which
//! re-splits by family only at the point of emitting bytes back onto the
//! wire.

use serde::{Deserialize, Serialize};

/// Which device family produced (or should receive) a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    B,
    J,
}

impl std::fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceFamily::B => write!(f, "B"),
            DeviceFamily::J => write!(f, "J"),
        }
    }
}

/// Closed set of normalized event kinds. Variant names are PascalCase by
/// Rust convention; the wire/push representation uses the exact wire
/// strings via `serde(rename)` so persisted JSON and push-stream payloads
/// match the schema byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
    #[serde(rename = "RFID_SNAPSHOT")]
    RfidSnapshot,
    #[serde(rename = "RFID_EVENT")]
    RfidEvent,
    #[serde(rename = "TEMP_HUM")]
    TempHum,
    #[serde(rename = "NOISE_LEVEL")]
    NoiseLevel,
    #[serde(rename = "DOOR_STATE")]
    DoorState,
    #[serde(rename = "DEVICE_METADATA")]
    DeviceMetadata,
    #[serde(rename = "META_CHANGED_EVENT")]
    MetaChangedEvent,
    #[serde(rename = "QRY_COLOR_RESP")]
    QryColorResp,
    #[serde(rename = "SET_COLOR_RESP")]
    SetColorResp,
    #[serde(rename = "CLEAR_ALARM_RESP")]
    ClearAlarmResp,
    /// Emitted only when the watchdog's optional device-status event is
    /// enabled; module-scoped since online state is tracked per telemetry
    /// entry. Not part of any inbound wire format.
    #[serde(rename = "DEVICE_STATUS_CHANGED")]
    DeviceStatusChanged,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Kind {
    /// True for kinds whose normalized event is always device-level
    /// (`moduleIndex == 0`)
    pub fn is_device_level(&self) -> bool {
        matches!(
            self,
            Kind::Heartbeat
                | Kind::DeviceMetadata
                | Kind::MetaChangedEvent
                | Kind::QryColorResp
                | Kind::SetColorResp
                | Kind::ClearAlarmResp
        )
    }
}

/// Outbound-only command kinds, never appearing as a `NormalizedEvent.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "QRY_RFID_SNAPSHOT")]
    QryRfidSnapshot,
    #[serde(rename = "QRY_TEMP_HUM")]
    QryTempHum,
    #[serde(rename = "QRY_DOOR_STATE")]
    QryDoorState,
    #[serde(rename = "QRY_NOISE_LEVEL")]
    QryNoiseLevel,
    #[serde(rename = "QRY_COLOR")]
    QryColor,
    #[serde(rename = "QRY_DEVICE_INFO")]
    QryDeviceInfo,
    #[serde(rename = "QRY_MODULE_INFO")]
    QryModuleInfo,
    #[serde(rename = "QRY_DEV_MOD_INFO")]
    QryDevModInfo,
    #[serde(rename = "SET_COLOR")]
    SetColor,
    #[serde(rename = "CLEAR_ALARM")]
    ClearAlarm,
}

/// A single heartbeat slot as carried on the wire: one module announcing
/// its presence, id and U-capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatSlot {
    pub module_index: u32,
    pub module_id: String,
    pub u_total: u32,
}

/// One RFID U-position as carried in a snapshot frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfidItem {
    pub sensor_index: u32,
    pub tag_id: String,
    pub is_alarm: bool,
}

/// One temperature/humidity sensor reading, pre-shift (`thIndex`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThItem {
    pub th_index: u32,
    pub temp: Option<f64>,
    pub hum: Option<f64>,
}

/// One noise sensor reading, pre-shift (`nsIndex`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseItem {
    pub ns_index: u32,
    pub noise: Option<f64>,
}

/// One module's firmware version, as carried in a MODULE_INFO frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFwEntry {
    pub module_index: u32,
    pub fw_ver: String,
}

/// One module's full metadata, as carried in a FamilyJ `devies_init_req`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetaEntry {
    pub module_index: u32,
    pub module_id: Option<String>,
    pub fw_ver: Option<String>,
    pub u_total: Option<u32>,
}

/// Result code carried by FamilyB command-response frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmdResult {
    Success,
    Failure,
}

/// One rack-position color, as carried in a QRY_COLOR_RESP payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorEntry {
    pub sensor_index: u32,
    pub color_code: u32,
}

/// Decoder-output body, one variant per message kind. Carries exactly the
/// fields a given wire frame can produce; the normalizer matches on this
/// instead of re-inspecting raw bytes or JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IfBody {
    Heartbeat {
        modules: Vec<HeartbeatSlot>,
    },
    RfidSnapshot {
        module_index: u32,
        module_id: String,
        u_total: Option<u32>,
        items: Vec<RfidItem>,
    },
    /// FamilyJ-only inbound notification; FamilyB never produces this body
    /// (RFID_EVENTs for FamilyB are always synthesized by diffing
    /// successive RFID_SNAPSHOTs).
    RfidEvent {
        module_index: u32,
        module_id: String,
        sensor_index: u32,
        /// Derived from `(new_state, old_state)`. Unused by
        /// the normalizer (FamilyJ re-derives attach/detach authoritatively
        /// from the snapshot diff it triggers), kept for debug logging.
        action: Option<RfidAction>,
    },
    TempHum {
        module_index: u32,
        module_id: String,
        items: Vec<ThItem>,
    },
    NoiseLevel {
        module_index: u32,
        module_id: String,
        items: Vec<NoiseItem>,
    },
    DoorState {
        module_index: u32,
        module_id: String,
        door_state: Option<i32>,
        door1_state: Option<i32>,
        door2_state: Option<i32>,
    },
    DeviceInfo {
        fw_ver: String,
        ip: String,
        netmask: String,
        gateway_ip: String,
        mac: String,
    },
    ModuleInfo {
        modules: Vec<ModuleFwEntry>,
    },
    DevModInfo {
        ip: Option<String>,
        mac: Option<String>,
        fw_ver: Option<String>,
        modules: Vec<ModuleMetaEntry>,
    },
    UtotalChanged {
        modules: Vec<ModuleMetaEntry>,
    },
    CommandResponse {
        module_index: u32,
        result: CmdResult,
        original_req: Vec<u8>,
        color_map: Option<Vec<ColorEntry>>,
    },
    Unknown {
        raw: serde_json::Value,
    },
}

/// Decoder output: one frame translated to the device-agnostic
/// Intermediate Form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateForm {
    pub device_family: DeviceFamily,
    pub device_id: String,
    pub kind: Kind,
    pub message_id: String,
    pub topic: String,
    pub raw_reference: String,
    pub body: IfBody,
}

/// A single record inside a `NormalizedEvent.payload`. Shape varies per
/// `kind`; `#[serde(untagged)]` means the JSON on the wire is exactly the
/// field set relevant to the emitting kind, with no extra discriminator
/// (the discriminator is `NormalizedEvent.kind` itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadRecord {
    Heartbeat {
        module_index: u32,
        module_id: String,
        u_total: u32,
    },
    RfidSnapshotItem {
        sensor_index: u32,
        tag_id: String,
        is_alarm: bool,
    },
    RfidEvent {
        sensor_index: u32,
        tag_id: String,
        action: RfidAction,
        is_alarm: bool,
    },
    TempHum {
        sensor_index: u32,
        temp: Option<f64>,
        hum: Option<f64>,
    },
    Noise {
        sensor_index: u32,
        noise: Option<f64>,
    },
    Door {
        door_state: Option<i32>,
        door1_state: Option<i32>,
        door2_state: Option<i32>,
    },
    MetaChanged {
        description: String,
    },
    DeviceStatusChanged {
        is_online: bool,
    },
    CommandResult {
        module_index: u32,
        result: CmdResult,
        original_req: String,
        color_map: Option<Vec<ColorEntry>>,
    },
    Raw(serde_json::Value),
}

/// Attach/detach/alarm-toggle action derived while diffing RFID snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RfidAction {
    #[serde(rename = "ATTACHED")]
    Attached,
    #[serde(rename = "DETACHED")]
    Detached,
    #[serde(rename = "ALARM_ON")]
    AlarmOn,
    #[serde(rename = "ALARM_OFF")]
    AlarmOff,
}

/// Normalizer output: the push-stream payload and the persistence
/// router's input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub device_id: String,
    pub device_family: DeviceFamily,
    pub kind: Kind,
    pub message_id: String,
    pub module_index: u32,
    pub module_id: String,
    pub payload: Vec<PayloadRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fw_ver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<String>,
}

impl NormalizedEvent {
    /// Constructs a device-level event (`moduleIndex == 0`, `moduleId == "0"`).
    pub fn device_level(
        device_id: impl Into<String>,
        device_family: DeviceFamily,
        kind: Kind,
        message_id: impl Into<String>,
        payload: Vec<PayloadRecord>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_family,
            kind,
            message_id: message_id.into(),
            module_index: 0,
            module_id: "0".to_string(),
            payload,
            ip: None,
            mac: None,
            fw_ver: None,
            netmask: None,
            gateway_ip: None,
        }
    }

    /// Constructs a module-scoped event.
    pub fn module_scoped(
        device_id: impl Into<String>,
        device_family: DeviceFamily,
        kind: Kind,
        message_id: impl Into<String>,
        module_index: u32,
        module_id: impl Into<String>,
        payload: Vec<PayloadRecord>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_family,
            kind,
            message_id: message_id.into(),
            module_index,
            module_id: module_id.into(),
            payload,
            ip: None,
            mac: None,
            fw_ver: None,
            netmask: None,
            gateway_ip: None,
        }
    }
}

/// Outbound command, produced either by the warmup controller, the
/// normalizer's self-healing path, or the read API's `POST /api/commands`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub device_id: String,
    pub device_family: DeviceFamily,
    pub kind: CommandKind,
    pub module_index: Option<u32>,
    pub module_id: Option<String>,
    pub sensor_index: Option<u32>,
    pub color_code: Option<u32>,
    pub color_items: Option<Vec<ColorEntry>>,
}

/// Sensor-index normalization shifts
pub mod sensor_index {
    pub const RFID_MIN: u32 = 1;
    pub const RFID_MAX: u32 = 54;
    pub const TEMP_HUM_SHIFT: u32 = 9;
    pub const TEMP_HUM_MIN: u32 = 10;
    pub const TEMP_HUM_MAX: u32 = 15;
    pub const NOISE_SHIFT: u32 = 15;
    pub const NOISE_MIN: u32 = 16;
    pub const NOISE_MAX: u32 = 18;

    pub fn temp_hum_index(th_index: u32) -> u32 {
        th_index + TEMP_HUM_SHIFT
    }

    pub fn noise_index(ns_index: u32) -> u32 {
        ns_index + NOISE_SHIFT
    }
}
