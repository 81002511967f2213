//! FamilyJ JSON frame decoder
//!
//! Parses the envelope once, resolves `deviceId` by the documented
//! priority chain, maps `msg_type` to a `Kind` through a fixed table, and
//! applies the field-aliasing table so downstream code never has to know
//! the wire's original key names.

use serde_json::Value;

use crate::decoder::domain::{DecodeError, COMPONENT_FAMILY_J};
use crate::model::domain::{
    CmdResult, ColorEntry, DeviceFamily, HeartbeatSlot, IfBody, IntermediateForm, Kind, ModuleMetaEntry, RfidAction,
    RfidItem, ThItem,
};

pub const COMPONENT: &str = COMPONENT_FAMILY_J;

/// Decodes one FamilyJ frame. Returns `Ok(None)` if the JSON fails to
/// parse at all; this is non-fatal, the caller emits an
/// `error` event and moves on.
pub fn decode(topic: &str, text: &str) -> Result<Option<IntermediateForm>, DecodeError> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Err(DecodeError::InvalidJson(e.to_string())),
    };

    Ok(Some(decode_value(topic, &value)?))
}

fn get_str(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(field) = v.get(key) {
            if field.is_null() {
                continue;
            }
            if let Some(s) = field.as_str() {
                if !s.is_empty() {
                    return Some(s.to_string());
                }
                continue;
            }
            return Some(field.to_string());
        }
    }
    None
}

fn get_u32(v: &Value, keys: &[&str]) -> Option<u32> {
    for key in keys {
        if let Some(field) = v.get(key) {
            if let Some(n) = field.as_u64() {
                return Some(n as u32);
            }
            if let Some(n) = field.as_i64() {
                return Some(n as u32);
            }
        }
    }
    None
}

fn get_f64(v: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(field) = v.get(key) {
            if let Some(n) = field.as_f64() {
                return Some(n);
            }
        }
    }
    None
}

/// `0 collapses to null` aliasing table for `temper_swot`/
/// `hygrometer_swot`.
fn zero_to_null(v: Option<f64>) -> Option<f64> {
    v.filter(|x| *x != 0.0)
}

fn message_id(v: &Value) -> String {
    v.get("uuid_number")
        .map(|f| {
            if let Some(s) = f.as_str() {
                s.to_string()
            } else {
                f.to_string()
            }
        })
        .unwrap_or_default()
}

fn resolve_device_id(v: &Value, msg_type: &str) -> String {
    let module_type = v.get("module_type").and_then(|x| x.as_str());
    if msg_type == "heart_beat_req" && module_type == Some("mt_gw") {
        if let Some(sn) = get_str(v, &["module_sn"]) {
            return sn;
        }
    }
    get_str(v, &["gateway_sn", "gateway_id", "device_id", "dev_id", "sn"]).unwrap_or_default()
}

fn parse_cmd_result(v: &Value) -> CmdResult {
    match v.get("result") {
        Some(Value::Bool(b)) => {
            if *b {
                CmdResult::Success
            } else {
                CmdResult::Failure
            }
        }
        Some(Value::Number(n)) => {
            if n.as_i64() == Some(1) {
                CmdResult::Success
            } else {
                CmdResult::Failure
            }
        }
        Some(Value::String(s)) if s.eq_ignore_ascii_case("success") => CmdResult::Success,
        _ => CmdResult::Failure,
    }
}

fn decode_value(topic: &str, v: &Value) -> Result<IntermediateForm, DecodeError> {
    let msg_type = v
        .get("msg_type")
        .and_then(|x| x.as_str())
        .ok_or_else(|| DecodeError::MissingField("msg_type".to_string()))?
        .to_string();

    let device_id = resolve_device_id(v, &msg_type);
    let message_id = message_id(v);

    let (kind, body) = match msg_type.as_str() {
        "heart_beat_req" => (Kind::Heartbeat, decode_heartbeat_body(v)),
        "u_state_resp" => (Kind::RfidSnapshot, decode_rfid_snapshot_body(v)),
        "u_state_changed_notify_req" => (Kind::RfidEvent, decode_rfid_event_body(v)),
        "temper_humidity_exception_nofity_req" | "temper_humidity_resp" => (Kind::TempHum, decode_temp_hum_body(v)),
        "door_state_changed_notify_req" | "door_state_resp" => (Kind::DoorState, decode_door_state_body(v)),
        "devies_init_req" => (Kind::DeviceMetadata, decode_dev_mod_info_body(v)),
        "devices_changed_req" => (Kind::DeviceMetadata, decode_utotal_changed_body(v)),
        "u_color" => (Kind::QryColorResp, decode_color_resp_body(v)),
        "set_module_property_result_req" => (Kind::SetColorResp, decode_simple_result_body(v)),
        "clear_u_warning" => (Kind::ClearAlarmResp, decode_simple_result_body(v)),
        _ => (Kind::Unknown, IfBody::Unknown { raw: v.clone() }),
    };

    Ok(IntermediateForm {
        device_family: DeviceFamily::J,
        device_id,
        kind,
        message_id,
        topic: topic.to_string(),
        raw_reference: v.to_string(),
        body,
    })
}

fn decode_heartbeat_body(v: &Value) -> IfBody {
    let modules = v
        .get("data")
        .and_then(|d| d.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|m| {
                    let module_index = get_u32(m, &["module_index", "host_gateway_port_index", "index"])?;
                    let module_id = get_str(m, &["module_sn", "extend_module_sn", "module_id"])?;
                    let u_total = get_u32(m, &["module_u_num"]).unwrap_or(0);
                    Some(HeartbeatSlot { module_index, module_id, u_total })
                })
                .collect()
        })
        .unwrap_or_default();
    IfBody::Heartbeat { modules }
}

fn decode_rfid_snapshot_body(v: &Value) -> IfBody {
    // FamilyJ responses may describe one or several modules in `data`;
    // the normalizer consumes one module per IF, so we surface the first.
    let module = v.get("data").and_then(|d| d.as_array()).and_then(|arr| arr.first());
    let module_index = module.and_then(|m| get_u32(m, &["module_index", "host_gateway_port_index", "index"])).unwrap_or(0);
    let module_id = module
        .and_then(|m| get_str(m, &["module_sn", "extend_module_sn", "module_id"]))
        .unwrap_or_default();
    let u_total = module.and_then(|m| get_u32(m, &["module_u_num"]));

    let items = module
        .and_then(|m| m.get("u_state_list").and_then(|l| l.as_array()))
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let sensor_index = get_u32(item, &["u_index"])?;
                    let tag_id = get_str(item, &["tag_code"])?;
                    let is_alarm = get_u32(item, &["warning"]).map(|w| w == 1).unwrap_or(false);
                    Some(RfidItem { sensor_index, tag_id, is_alarm })
                })
                .collect()
        })
        .unwrap_or_default();

    IfBody::RfidSnapshot { module_index, module_id, u_total, items }
}

fn decode_rfid_event_body(v: &Value) -> IfBody {
    let module_index = get_u32(v, &["module_index", "host_gateway_port_index", "index"]).unwrap_or(0);
    let module_id = get_str(v, &["module_sn", "extend_module_sn", "module_id"]).unwrap_or_default();
    let sensor_index = get_u32(v, &["u_index"]).unwrap_or(0);
    let new_state = get_u32(v, &["new_state"]);
    let old_state = get_u32(v, &["old_state"]);
    let action = match (new_state, old_state) {
        (Some(1), Some(0)) => Some(RfidAction::Attached),
        (Some(0), Some(1)) => Some(RfidAction::Detached),
        _ => None,
    };
    IfBody::RfidEvent { module_index, module_id, sensor_index, action }
}

fn decode_temp_hum_body(v: &Value) -> IfBody {
    let module_index = get_u32(v, &["module_index", "host_gateway_port_index", "index"]).unwrap_or(0);
    let module_id = get_str(v, &["module_sn", "extend_module_sn", "module_id"]).unwrap_or_default();

    let items = v
        .get("data")
        .and_then(|d| d.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let th_index = get_u32(item, &["temper_position"])?;
                    let temp = zero_to_null(get_f64(item, &["temper_swot"]));
                    let hum = zero_to_null(get_f64(item, &["hygrometer_swot"]));
                    Some(ThItem { th_index, temp, hum })
                })
                .collect()
        })
        .unwrap_or_default();

    IfBody::TempHum { module_index, module_id, items }
}

fn decode_door_state_body(v: &Value) -> IfBody {
    let module_index = get_u32(v, &["module_index", "host_gateway_port_index", "index"]).unwrap_or(0);
    let module_id = get_str(v, &["module_sn", "extend_module_sn", "module_id"]).unwrap_or_default();

    let door_state = get_u32(v, &["new_state"]).map(|n| n as i32);
    let door1_state = get_u32(v, &["new_state1"]).map(|n| n as i32);
    let door2_state = get_u32(v, &["new_state2"]).map(|n| n as i32);

    IfBody::DoorState { module_index, module_id, door_state, door1_state, door2_state }
}

fn decode_dev_mod_info_body(v: &Value) -> IfBody {
    let ip = get_str(v, &["gateway_ip"]);
    let mac = get_str(v, &["gateway_mac"]);
    let fw_ver = get_str(v, &["gateway_fw_ver"]);

    let modules = v
        .get("data")
        .and_then(|d| d.as_array())
        .map(|arr| {
            arr.iter()
                .map(|m| ModuleMetaEntry {
                    module_index: get_u32(m, &["module_index", "host_gateway_port_index", "index"]).unwrap_or(0),
                    module_id: get_str(m, &["module_sn", "extend_module_sn", "module_id"]),
                    fw_ver: get_str(m, &["module_sw_version"]),
                    u_total: get_u32(m, &["module_u_num"]),
                })
                .collect()
        })
        .unwrap_or_default();

    IfBody::DevModInfo { ip, mac, fw_ver, modules }
}

fn decode_utotal_changed_body(v: &Value) -> IfBody {
    let modules = v
        .get("data")
        .and_then(|d| d.as_array())
        .map(|arr| {
            arr.iter()
                .map(|m| ModuleMetaEntry {
                    module_index: get_u32(m, &["module_index", "host_gateway_port_index", "index"]).unwrap_or(0),
                    module_id: get_str(m, &["module_sn", "extend_module_sn", "module_id"]),
                    fw_ver: None,
                    u_total: get_u32(m, &["module_u_num"]),
                })
                .collect()
        })
        .unwrap_or_default();

    IfBody::UtotalChanged { modules }
}

fn decode_color_resp_body(v: &Value) -> IfBody {
    let module_index = get_u32(v, &["module_index", "host_gateway_port_index", "index"]).unwrap_or(0);
    let result = parse_cmd_result(v);

    let color_map = v.get("data").and_then(|d| d.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|item| {
                let sensor_index = get_u32(item, &["u_index"])?;
                let color_code = get_u32(item, &["code"]).unwrap_or(0);
                Some(ColorEntry { sensor_index, color_code })
            })
            .collect()
    });

    IfBody::CommandResponse { module_index, result, original_req: Vec::new(), color_map }
}

fn decode_simple_result_body(v: &Value) -> IfBody {
    let module_index = get_u32(v, &["module_index", "host_gateway_port_index", "index"]).unwrap_or(0);
    let result = parse_cmd_result(v);
    IfBody::CommandResponse { module_index, result, original_req: Vec::new(), color_map: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_json_with_error_not_panic() {
        let result = decode("jUpload/dev-1", "{not json");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_msg_type_yields_unknown_kind_with_raw_payload() {
        let text = r#"{"msg_type":"totally_new_thing","gateway_sn":"GW1","uuid_number":5,"extra":true}"#;
        let result = decode("jUpload/dev-1", text).unwrap().unwrap();
        assert_eq!(result.kind, Kind::Unknown);
        match result.body {
            IfBody::Unknown { raw } => assert_eq!(raw["extra"], true),
            _ => panic!("wrong body"),
        }
    }

    #[test]
    fn heartbeat_device_id_prefers_module_sn_for_gateway_type() {
        let text = r#"{"msg_type":"heart_beat_req","module_type":"mt_gw","module_sn":"GW-XYZ","gateway_sn":"should-not-use","uuid_number":9,"data":[]}"#;
        let result = decode("jUpload/dev-1", text).unwrap().unwrap();
        assert_eq!(result.device_id, "GW-XYZ");
    }

    #[test]
    fn rfid_event_derives_attached_action() {
        let text = r#"{"msg_type":"u_state_changed_notify_req","gateway_sn":"GW1","uuid_number":1,"module_index":1,"u_index":3,"new_state":1,"old_state":0}"#;
        let result = decode("jUpload/dev-1", text).unwrap().unwrap();
        match result.body {
            IfBody::RfidEvent { action, .. } => assert_eq!(action, Some(RfidAction::Attached)),
            _ => panic!("wrong body"),
        }
    }

    #[test]
    fn temp_hum_zero_collapses_to_null() {
        let text = r#"{"msg_type":"temper_humidity_resp","gateway_sn":"GW1","uuid_number":1,"module_index":1,"data":[{"temper_position":1,"temper_swot":0,"hygrometer_swot":55.0}]}"#;
        let result = decode("jUpload/dev-1", text).unwrap().unwrap();
        match result.body {
            IfBody::TempHum { items, .. } => {
                assert_eq!(items[0].temp, None);
                assert_eq!(items[0].hum, Some(55.0));
            }
            _ => panic!("wrong body"),
        }
    }
}
