//! HTTP/WebSocket API shapes: shared state and request/response DTOs.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::bus::domain::EventBus;
use crate::config::Config;
use crate::model::domain::{ColorEntry, CommandKind, DeviceFamily};
use crate::persistence::repository::Repository;
use crate::shadow::domain::Shadow;

#[derive(Clone)]
pub struct AppState {
    pub shadow: Shadow,
    pub bus: EventBus,
    pub config: Config,
    pub started_at: Instant,
    pub db_healthy: std::sync::Arc<std::sync::atomic::AtomicBool>,
    pub broker_healthy: std::sync::Arc<std::sync::atomic::AtomicBool>,
    /// `None` when storage is disabled; history endpoints return `501` in
    /// that case regardless of `apiServer.features.history`.
    pub repository: Option<Repository>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub memory: MemoryUsage,
    pub db: &'static str,
    pub broker: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MemoryUsage {
    /// Best-effort process RSS in bytes; `None` when unavailable on the
    /// current platform rather than reporting a fabricated number.
    pub rss_bytes: Option<u64>,
}

/// One device in the live topology listing: metadata plus each module's
/// live online state, joined out of the telemetry side of the shadow.
#[derive(Debug, Serialize)]
pub struct TopologyDevice {
    pub device_id: String,
    pub device_family: DeviceFamily,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub fw_ver: Option<String>,
    pub active_modules: Vec<TopologyModule>,
}

#[derive(Debug, Serialize)]
pub struct TopologyModule {
    pub module_index: u32,
    pub module_id: String,
    pub fw_ver: Option<String>,
    pub u_total: Option<u32>,
    pub is_online: bool,
    pub last_seen_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequestBody {
    pub device_id: String,
    pub device_family: DeviceFamily,
    pub kind: CommandKind,
    #[serde(default)]
    pub payload: Option<CommandPayload>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CommandPayload {
    pub module_index: Option<u32>,
    pub module_id: Option<String>,
    pub sensor_index: Option<u32>,
    pub color_code: Option<u32>,
    pub color_items: Option<Vec<ColorEntry>>,
}

#[derive(Debug, Serialize)]
pub struct CommandAcceptedResponse {
    pub status: &'static str,
    pub command_id: String,
}
