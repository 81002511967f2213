//! The shadow cache: an in-memory twin of every device and module ever
//! seen It is the only shared mutable state in the
//! process ; every mutation is routed through `logic.rs`'s
//! `merge`/`reconcile`/`set_telemetry_field`/`update_heartbeat` so a
//! read-modify-write on one entry never interleaves with another
//! operation on that same entry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::domain::DeviceFamily;

/// One RFID U-position as held in the shadow (the latest snapshot, never
/// a delta — invariant 5 ).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfidReading {
    pub sensor_index: u32,
    pub tag_id: String,
    pub is_alarm: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThReading {
    pub sensor_index: u32,
    pub temp: Option<f64>,
    pub hum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseReading {
    pub sensor_index: u32,
    pub noise: Option<f64>,
}

/// Per-`(deviceId, moduleIndex)` telemetry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub device_id: String,
    pub device_family: DeviceFamily,
    pub module_index: u32,
    pub module_id: String,

    pub is_online: bool,
    pub last_seen_heartbeat: Option<DateTime<Utc>>,

    pub u_total: Option<u32>,

    pub temp_hum: Vec<ThReading>,
    pub last_seen_temp_hum: Option<DateTime<Utc>>,

    pub noise: Vec<NoiseReading>,
    pub last_seen_noise: Option<DateTime<Utc>>,

    pub rfid: Vec<RfidReading>,
    pub last_seen_rfid: Option<DateTime<Utc>>,

    pub door_state: Option<i32>,
    pub door1_state: Option<i32>,
    pub door2_state: Option<i32>,
    pub last_seen_door: Option<DateTime<Utc>>,

    /// Query kinds with an outbound request in flight but no response yet.
    /// Best-effort de-dup refinement noted as optional  — a
    /// duplicate outbound query under high heartbeat rate is tolerated,
    /// never treated as an error.
    pub pending_queries: std::collections::HashSet<String>,
}

impl TelemetryEntry {
    pub fn new(device_id: String, device_family: DeviceFamily, module_index: u32, module_id: String) -> Self {
        Self {
            device_id,
            device_family,
            module_index,
            module_id,
            is_online: false,
            last_seen_heartbeat: None,
            u_total: None,
            temp_hum: Vec::new(),
            last_seen_temp_hum: None,
            noise: Vec::new(),
            last_seen_noise: None,
            rfid: Vec::new(),
            last_seen_rfid: None,
            door_state: None,
            door1_state: None,
            door2_state: None,
            last_seen_door: None,
            pending_queries: std::collections::HashSet::new(),
        }
    }
}

/// One entry of `MetadataEntry.active_modules`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveModule {
    pub module_index: u32,
    pub module_id: String,
    pub fw_ver: Option<String>,
    pub u_total: Option<u32>,
}

/// Per-`deviceId` metadata entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub device_id: String,
    pub device_family: DeviceFamily,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub fw_ver: Option<String>,
    pub netmask: Option<String>,
    pub gateway_ip: Option<String>,
    pub last_seen_info: Option<DateTime<Utc>>,
    /// Order-stable by `module_index` across merge/reconcile.
    pub active_modules: Vec<ActiveModule>,
}

impl MetadataEntry {
    pub fn new(device_id: String, device_family: DeviceFamily) -> Self {
        Self {
            device_id,
            device_family,
            ip: None,
            mac: None,
            fw_ver: None,
            netmask: None,
            gateway_ip: None,
            last_seen_info: None,
            active_modules: Vec::new(),
        }
    }
}

/// Keys the telemetry map by `(deviceId, moduleIndex)`.
pub type TelemetryKey = (String, u32);

/// Process-scoped shared cache. Cheap to clone: internally `Arc`-backed
/// via `DashMap`, so every task holding a `Shadow` shares the same
/// underlying maps.
#[derive(Clone, Debug, Default)]
pub struct Shadow {
    telemetry: std::sync::Arc<DashMap<TelemetryKey, TelemetryEntry>>,
    metadata: std::sync::Arc<DashMap<String, MetadataEntry>>,
}

impl Shadow {
    pub fn new() -> Self {
        Self {
            telemetry: std::sync::Arc::new(DashMap::new()),
            metadata: std::sync::Arc::new(DashMap::new()),
        }
    }

    pub fn telemetry_map(&self) -> &DashMap<TelemetryKey, TelemetryEntry> {
        &self.telemetry
    }

    pub fn metadata_map(&self) -> &DashMap<String, MetadataEntry> {
        &self.metadata
    }

    /// Lazily creates a telemetry entry if absent invariant 3
    /// ("a telemetry entry exists iff the device has ever sent a heartbeat
    /// or telemetry naming that module").
    pub fn telemetry_entry(
        &self,
        device_id: &str,
        device_family: DeviceFamily,
        module_index: u32,
        module_id: &str,
    ) -> dashmap::mapref::one::RefMut<'_, TelemetryKey, TelemetryEntry> {
        self.telemetry
            .entry((device_id.to_string(), module_index))
            .or_insert_with(|| TelemetryEntry::new(device_id.to_string(), device_family, module_index, module_id.to_string()))
    }

    pub fn telemetry_get(&self, device_id: &str, module_index: u32) -> Option<TelemetryEntry> {
        self.telemetry
            .get(&(device_id.to_string(), module_index))
            .map(|r| r.value().clone())
    }

    /// Lazily creates a metadata entry if absent.
    pub fn metadata_entry(
        &self,
        device_id: &str,
        device_family: DeviceFamily,
    ) -> dashmap::mapref::one::RefMut<'_, String, MetadataEntry> {
        self.metadata
            .entry(device_id.to_string())
            .or_insert_with(|| MetadataEntry::new(device_id.to_string(), device_family))
    }

    pub fn metadata_get(&self, device_id: &str) -> Option<MetadataEntry> {
        self.metadata.get(device_id).map(|r| r.value().clone())
    }

    pub fn all_metadata(&self) -> Vec<MetadataEntry> {
        self.metadata.iter().map(|r| r.value().clone()).collect()
    }

    pub fn all_telemetry(&self) -> Vec<TelemetryEntry> {
        self.telemetry.iter().map(|r| r.value().clone()).collect()
    }
}
