//! Warmup controller input/config shapes. The controller is a pure
//! function over a heartbeat snapshot and never reaches back into the
//! shadow or normalizer itself.

use chrono::{DateTime, Utc};

use crate::model::domain::DeviceFamily;

#[derive(Debug, Clone)]
pub struct WarmupConfig {
    pub enabled: bool,
    pub temp_hum_staleness: chrono::Duration,
    pub rfid_staleness: chrono::Duration,
    pub stagger_delay: std::time::Duration,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            temp_hum_staleness: chrono::Duration::minutes(5),
            rfid_staleness: chrono::Duration::minutes(60),
            stagger_delay: std::time::Duration::from_millis(500),
        }
    }
}

/// Read-only view of one module as of the triggering heartbeat, assembled
/// by the normalizer from the shadow immediately before calling `plan`.
#[derive(Debug, Clone)]
pub struct ModuleSnapshot {
    pub module_index: u32,
    pub module_id: String,
    pub fw_ver: Option<String>,
    pub temp_hum_empty: bool,
    pub last_seen_temp_hum: Option<DateTime<Utc>>,
    pub rfid_empty: bool,
    pub last_seen_rfid: Option<DateTime<Utc>>,
    pub door_state: Option<i32>,
    pub door1_state: Option<i32>,
}

/// Read-only view of the device as of the triggering heartbeat, in
/// heartbeat-slot order — `plan` never reorders `modules`.
#[derive(Debug, Clone)]
pub struct HeartbeatSnapshot {
    pub device_id: String,
    pub device_family: DeviceFamily,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub modules: Vec<ModuleSnapshot>,
}
