//! Command builder output shapes.

use crate::model::domain::CommandKind;

/// A frame ready to publish on the broker: raw bytes for FamilyB, a
/// structured JSON value for FamilyJ.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandBuildError {
    #[error("command missing deviceId")]
    MissingDeviceId,
    #[error("command {0:?} requires moduleIndex")]
    MissingModuleIndex(CommandKind),
    #[error("FamilyJ RFID snapshot query requires moduleId")]
    MissingModuleId,
    #[error("SET_COLOR requires sensorIndex and colorCode (or colorItems)")]
    MissingColorFields,
    #[error("{0:?} is not supported for this device family")]
    UnsupportedForFamily(CommandKind),
}

/// An already-validated and translated command, ready for `broker::publish`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltCommand {
    pub topic: String,
    pub frame: OutboundFrame,
}
