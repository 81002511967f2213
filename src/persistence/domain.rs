//! Row shapes for every persisted table (§4.7) and the pure routing
//! function that turns one `NormalizedEvent` into zero or more rows,
//! buffered per table until the next flush.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::domain::{CmdResult, Kind, NormalizedEvent, PayloadRecord};

fn cmd_result_str(result: CmdResult) -> &'static str {
    match result {
        CmdResult::Success => "Success",
        CmdResult::Failure => "Failure",
    }
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct HeartbeatRow {
    pub device_id: String,
    pub message_id: String,
    pub payload: Value,
    pub parse_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RfidSnapshotRow {
    pub device_id: String,
    pub module_index: i32,
    pub module_id: String,
    pub message_id: String,
    pub snapshot: Value,
    pub parse_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct RfidEventRow {
    pub device_id: String,
    pub module_index: i32,
    pub module_id: String,
    pub message_id: String,
    pub sensor_index: i32,
    pub tag_id: String,
    pub action: String,
    pub is_alarm: bool,
    pub parse_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, sqlx::FromRow, serde::Serialize)]
pub struct TempHumRow {
    pub device_id: String,
    pub module_index: i32,
    pub module_id: String,
    pub message_id: String,
    pub temp_index10: Option<f64>,
    pub hum_index10: Option<f64>,
    pub temp_index11: Option<f64>,
    pub hum_index11: Option<f64>,
    pub temp_index12: Option<f64>,
    pub hum_index12: Option<f64>,
    pub temp_index13: Option<f64>,
    pub hum_index13: Option<f64>,
    pub temp_index14: Option<f64>,
    pub hum_index14: Option<f64>,
    pub temp_index15: Option<f64>,
    pub hum_index15: Option<f64>,
    pub parse_at: Option<DateTime<Utc>>,
}

impl TempHumRow {
    fn set(&mut self, sensor_index: u32, temp: Option<f64>, hum: Option<f64>) {
        match sensor_index {
            10 => { self.temp_index10 = temp; self.hum_index10 = hum; }
            11 => { self.temp_index11 = temp; self.hum_index11 = hum; }
            12 => { self.temp_index12 = temp; self.hum_index12 = hum; }
            13 => { self.temp_index13 = temp; self.hum_index13 = hum; }
            14 => { self.temp_index14 = temp; self.hum_index14 = hum; }
            15 => { self.temp_index15 = temp; self.hum_index15 = hum; }
            _ => {}
        }
    }

    fn has_any_column(&self) -> bool {
        self.temp_index10.is_some()
            || self.hum_index10.is_some()
            || self.temp_index11.is_some()
            || self.hum_index11.is_some()
            || self.temp_index12.is_some()
            || self.hum_index12.is_some()
            || self.temp_index13.is_some()
            || self.hum_index13.is_some()
            || self.temp_index14.is_some()
            || self.hum_index14.is_some()
            || self.temp_index15.is_some()
            || self.hum_index15.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoiseLevelRow {
    pub device_id: String,
    pub module_index: i32,
    pub module_id: String,
    pub message_id: String,
    pub noise_index16: Option<f64>,
    pub noise_index17: Option<f64>,
    pub noise_index18: Option<f64>,
    pub parse_at: Option<DateTime<Utc>>,
}

impl NoiseLevelRow {
    fn set(&mut self, sensor_index: u32, noise: Option<f64>) {
        match sensor_index {
            16 => self.noise_index16 = noise,
            17 => self.noise_index17 = noise,
            18 => self.noise_index18 = noise,
            _ => {}
        }
    }

    fn has_any_column(&self) -> bool {
        self.noise_index16.is_some() || self.noise_index17.is_some() || self.noise_index18.is_some()
    }
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct DoorEventRow {
    pub device_id: String,
    pub module_index: i32,
    pub module_id: String,
    pub message_id: String,
    pub door_state: Option<i32>,
    pub door1_state: Option<i32>,
    pub door2_state: Option<i32>,
    pub parse_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MetaDataRow {
    pub device_id: String,
    pub device_family: String,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub fw_ver: Option<String>,
    pub netmask: Option<String>,
    pub gateway_ip: Option<String>,
    pub active_modules: Value,
    pub parse_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TopChangeEventRow {
    pub device_id: String,
    pub message_id: String,
    pub description: String,
    pub parse_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CmdResultRow {
    pub device_id: String,
    pub module_index: i32,
    pub message_id: String,
    pub result: String,
    pub original_req: String,
    pub color_map: Option<Value>,
    pub parse_at: DateTime<Utc>,
}

/// Per-table accumulation buffers. Flushed as a whole when the combined
/// row count reaches `batchSize` or `flushInterval` elapses, whichever
/// comes first. A table whose flush fails keeps its rows for the next
/// cycle instead of being cleared.
#[derive(Debug, Clone, Default)]
pub struct PersistenceBuffers {
    pub heartbeat: Vec<HeartbeatRow>,
    pub rfid_snapshot: Vec<RfidSnapshotRow>,
    pub rfid_event: Vec<RfidEventRow>,
    pub temp_hum: Vec<TempHumRow>,
    pub noise_level: Vec<NoiseLevelRow>,
    pub door_event: Vec<DoorEventRow>,
    pub meta_data: Vec<MetaDataRow>,
    pub topchange_event: Vec<TopChangeEventRow>,
    pub cmd_result: Vec<CmdResultRow>,
}

impl PersistenceBuffers {
    pub fn total_len(&self) -> usize {
        self.heartbeat.len()
            + self.rfid_snapshot.len()
            + self.rfid_event.len()
            + self.temp_hum.len()
            + self.noise_level.len()
            + self.door_event.len()
            + self.meta_data.len()
            + self.topchange_event.len()
            + self.cmd_result.len()
    }
}

/// Routes one normalized event into the buffers it belongs in. Pure and
/// infallible: an event whose kind has no persisted table (currently only
/// `UNKNOWN`) is simply not routed anywhere.
pub fn route_event(event: &NormalizedEvent, buffers: &mut PersistenceBuffers, now: DateTime<Utc>) {
    let device_id = event.device_id.clone();
    let module_index = event.module_index as i32;
    let module_id = event.module_id.clone();
    let message_id = event.message_id.clone();

    match event.kind {
        Kind::Heartbeat => {
            let payload = serde_json::to_value(&event.payload).unwrap_or(Value::Null);
            buffers.heartbeat.push(HeartbeatRow { device_id, message_id, payload, parse_at: now });
        }
        Kind::RfidSnapshot => {
            let snapshot = serde_json::to_value(&event.payload).unwrap_or(Value::Null);
            buffers.rfid_snapshot.push(RfidSnapshotRow {
                device_id,
                module_index,
                module_id,
                message_id,
                snapshot,
                parse_at: now,
            });
        }
        Kind::RfidEvent => {
            for record in &event.payload {
                if let PayloadRecord::RfidEvent { sensor_index, tag_id, action, is_alarm } = record {
                    buffers.rfid_event.push(RfidEventRow {
                        device_id: device_id.clone(),
                        module_index,
                        module_id: module_id.clone(),
                        message_id: message_id.clone(),
                        sensor_index: *sensor_index as i32,
                        tag_id: tag_id.clone(),
                        action: format!("{action:?}").to_uppercase(),
                        is_alarm: *is_alarm,
                        parse_at: now,
                    });
                }
            }
        }
        Kind::TempHum => {
            let mut row = TempHumRow {
                device_id,
                module_index,
                module_id,
                message_id,
                parse_at: Some(now),
                ..Default::default()
            };
            for record in &event.payload {
                if let PayloadRecord::TempHum { sensor_index, temp, hum } = record {
                    row.set(*sensor_index, *temp, *hum);
                }
            }
            if row.has_any_column() {
                buffers.temp_hum.push(row);
            }
        }
        Kind::NoiseLevel => {
            let mut row = NoiseLevelRow {
                device_id,
                module_index,
                module_id,
                message_id,
                parse_at: Some(now),
                ..Default::default()
            };
            for record in &event.payload {
                if let PayloadRecord::Noise { sensor_index, noise } = record {
                    row.set(*sensor_index, *noise);
                }
            }
            if row.has_any_column() {
                buffers.noise_level.push(row);
            }
        }
        Kind::DoorState => {
            if let Some(PayloadRecord::Door { door_state, door1_state, door2_state }) = event.payload.first() {
                buffers.door_event.push(DoorEventRow {
                    device_id,
                    module_index,
                    module_id,
                    message_id,
                    door_state: *door_state,
                    door1_state: *door1_state,
                    door2_state: *door2_state,
                    parse_at: now,
                });
            }
        }
        Kind::DeviceMetadata => {
            let active_modules = serde_json::to_value(&event.payload).unwrap_or(Value::Null);
            buffers.meta_data.push(MetaDataRow {
                device_id,
                device_family: event.device_family.to_string(),
                ip: event.ip.clone(),
                mac: event.mac.clone(),
                fw_ver: event.fw_ver.clone(),
                netmask: event.netmask.clone(),
                gateway_ip: event.gateway_ip.clone(),
                active_modules,
                parse_at: now,
            });
        }
        Kind::MetaChangedEvent => {
            for record in &event.payload {
                if let PayloadRecord::MetaChanged { description } = record {
                    buffers.topchange_event.push(TopChangeEventRow {
                        device_id: device_id.clone(),
                        message_id: message_id.clone(),
                        description: description.clone(),
                        parse_at: now,
                    });
                }
            }
        }
        Kind::QryColorResp | Kind::SetColorResp | Kind::ClearAlarmResp => {
            if let Some(PayloadRecord::CommandResult { module_index, result, original_req, color_map }) =
                event.payload.first()
            {
                buffers.cmd_result.push(CmdResultRow {
                    device_id,
                    module_index: *module_index as i32,
                    message_id,
                    result: cmd_result_str(*result).to_string(),
                    original_req: original_req.clone(),
                    color_map: color_map.as_ref().and_then(|v| serde_json::to_value(v).ok()),
                    parse_at: now,
                });
            }
        }
        Kind::Unknown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::domain::DeviceFamily;

    #[test]
    fn temp_hum_pivot_sets_only_matching_columns() {
        let event = NormalizedEvent::module_scoped(
            "dev-1",
            DeviceFamily::J,
            Kind::TempHum,
            "m-1",
            1,
            "MOD-A",
            vec![
                PayloadRecord::TempHum { sensor_index: 10, temp: Some(25.5), hum: Some(60.0) },
                PayloadRecord::TempHum { sensor_index: 15, temp: Some(26.0), hum: Some(65.0) },
            ],
        );
        let mut buffers = PersistenceBuffers::default();
        route_event(&event, &mut buffers, Utc::now());

        assert_eq!(buffers.temp_hum.len(), 1);
        let row = &buffers.temp_hum[0];
        assert_eq!(row.temp_index10, Some(25.5));
        assert_eq!(row.hum_index10, Some(60.0));
        assert_eq!(row.temp_index15, Some(26.0));
        assert_eq!(row.hum_index15, Some(65.0));
        assert_eq!(row.temp_index11, None);
        assert_eq!(row.temp_index12, None);
    }

    #[test]
    fn unknown_kind_is_not_routed_anywhere() {
        let event = NormalizedEvent::device_level(
            "dev-1",
            DeviceFamily::J,
            Kind::Unknown,
            "m-1",
            vec![PayloadRecord::Raw(Value::Null)],
        );
        let mut buffers = PersistenceBuffers::default();
        route_event(&event, &mut buffers, Utc::now());
        assert_eq!(buffers.total_len(), 0);
    }

    #[test]
    fn meta_changed_event_emits_one_row_per_description() {
        let event = NormalizedEvent::device_level(
            "dev-1",
            DeviceFamily::B,
            Kind::MetaChangedEvent,
            "m-1",
            vec![
                PayloadRecord::MetaChanged { description: "Module B removed from Index 2".to_string() },
                PayloadRecord::MetaChanged { description: "Device IP changed from a to b".to_string() },
            ],
        );
        let mut buffers = PersistenceBuffers::default();
        route_event(&event, &mut buffers, Utc::now());
        assert_eq!(buffers.topchange_event.len(), 2);
    }
}
