//! FamilyB binary frame decoder
//!
//! Kind is resolved by strict precedence — topic suffix, then first byte,
//! then first two bytes, then (for `0xAA` command-response frames) the
//! command code at byte offset 6 — and every per-kind byte layout is
//! implemented literally, including Algorithm A's signed fixed-point
//! decode for temperature/humidity/noise bytes.

use crate::decoder::domain::{DecodeError, COMPONENT_FAMILY_B};
use crate::model::domain::{
    CmdResult, ColorEntry, DeviceFamily, HeartbeatSlot, IfBody, IntermediateForm, Kind, ModuleFwEntry, NoiseItem,
    RfidItem, ThItem,
};

const HEARTBEAT_MODULE_SLOTS: usize = 10;
const TEMP_HUM_SLOTS: usize = 6;
const NOISE_SLOTS: usize = 3;

/// Decodes one FamilyB frame. Returns `Ok(None)` when no recognizable
/// frame could be formed ("no frame", never a panic); the caller is
/// responsible for publishing the corresponding
/// `error` event tagged with [`COMPONENT_FAMILY_B`].
pub fn decode(topic: &str, bytes: &[u8]) -> Result<Option<IntermediateForm>, DecodeError> {
    match resolve_and_decode(topic, bytes) {
        Ok(if_form) => Ok(Some(if_form)),
        Err(DecodeError::UnrecognizedFrame { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

pub const COMPONENT: &str = COMPONENT_FAMILY_B;

fn topic_device_id(topic: &str) -> String {
    topic.split('/').nth(1).unwrap_or(topic).to_string()
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn message_id_from_tail(bytes: &[u8]) -> Result<String, DecodeError> {
    if bytes.len() < 4 {
        return Err(DecodeError::TooShort { need: 4, got: bytes.len() });
    }
    let tail = &bytes[bytes.len() - 4..];
    Ok(be_u32(tail).to_string())
}

fn module_id_hex(bytes: &[u8]) -> String {
    format!("{:08X}", be_u32(bytes))
}

fn dotted_ip(bytes: &[u8]) -> String {
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}

fn colon_mac(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":")
}

fn dotted_fw(bytes: &[u8]) -> String {
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}

/// Algorithm A: signed fixed-point decode for a `(intByte, fracByte)` pair.
/// `0x00 0x00` is null; otherwise the high bit of `intByte` is a sign
/// flag over the low 7 bits (magnitude), and the fractional byte is added
/// in that same direction, as hundredths.
pub fn decode_signed_fixed(int_byte: u8, frac_byte: u8) -> Option<f64> {
    if int_byte == 0 && frac_byte == 0 {
        return None;
    }
    let negative = int_byte & 0x80 != 0;
    let magnitude = (int_byte & 0x7F) as i32;
    let signed_int = if negative { -magnitude } else { magnitude };
    let sign = if signed_int == 0 { 1.0 } else { signed_int.signum() as f64 };
    let value = signed_int as f64 + sign * (frac_byte as f64 / 100.0);
    Some((value * 100.0).round() / 100.0)
}

fn need(bytes: &[u8], len: usize) -> Result<(), DecodeError> {
    if bytes.len() < len {
        Err(DecodeError::TooShort { need: len, got: bytes.len() })
    } else {
        Ok(())
    }
}

fn resolve_and_decode(topic: &str, bytes: &[u8]) -> Result<IntermediateForm, DecodeError> {
    if topic.ends_with("/LabelState") {
        return decode_rfid_snapshot(topic, bytes);
    }
    if topic.ends_with("/TemHum") {
        return decode_temp_hum(topic, bytes);
    }
    if topic.ends_with("/Noise") {
        return decode_noise(topic, bytes);
    }

    let first = *bytes.first().ok_or(DecodeError::UnrecognizedFrame { topic: topic.to_string(), first_byte: None })?;

    match first {
        0xBA => return decode_door_state(topic, bytes),
        0xCC | 0xCB => return decode_heartbeat(topic, bytes),
        0xBB => return decode_rfid_snapshot(topic, bytes),
        _ => {}
    }

    if bytes.len() >= 2 {
        match (bytes[0], bytes[1]) {
            (0xEF, 0x01) => return decode_device_info(topic, bytes),
            (0xEF, 0x02) => return decode_module_info(topic, bytes),
            _ => {}
        }
    }

    if first == 0xAA {
        need(bytes, 7)?;
        return decode_command_response(topic, bytes);
    }

    Err(DecodeError::UnrecognizedFrame { topic: topic.to_string(), first_byte: Some(first) })
}

fn decode_heartbeat(topic: &str, bytes: &[u8]) -> Result<IntermediateForm, DecodeError> {
    need(bytes, 1 + HEARTBEAT_MODULE_SLOTS * 6 + 4)?;
    let device_id = topic_device_id(topic);
    let message_id = message_id_from_tail(bytes)?;

    let mut modules = Vec::new();
    let mut offset = 1;
    for _ in 0..HEARTBEAT_MODULE_SLOTS {
        let module_index = bytes[offset] as u32;
        let module_id_bytes = &bytes[offset + 1..offset + 5];
        let u_total = bytes[offset + 5] as u32;
        let module_id_val = be_u32(module_id_bytes);

        if module_id_val != 0 && module_index <= 5 {
            modules.push(HeartbeatSlot {
                module_index,
                module_id: module_id_hex(module_id_bytes),
                u_total,
            });
        }
        offset += 6;
    }

    Ok(IntermediateForm {
        device_family: DeviceFamily::B,
        device_id,
        kind: Kind::Heartbeat,
        message_id,
        topic: topic.to_string(),
        raw_reference: hex::encode(bytes),
        body: IfBody::Heartbeat { modules },
    })
}

fn decode_rfid_snapshot(topic: &str, bytes: &[u8]) -> Result<IntermediateForm, DecodeError> {
    need(bytes, 6)?;
    let device_id = topic_device_id(topic);
    let module_index = bytes[1] as u32;
    let module_id = module_id_hex(&bytes[2..6]);

    need(bytes, 9)?;
    let u_total = bytes[7] as u32;
    let count = bytes[8] as usize;

    need(bytes, 9 + count * 6 + 4)?;
    let message_id = message_id_from_tail(bytes)?;

    let mut items = Vec::with_capacity(count);
    let mut offset = 9;
    for _ in 0..count {
        let u_index = bytes[offset] as u32;
        let alarm = bytes[offset + 1] != 0;
        let tag_id = format!("{:08X}", be_u32(&bytes[offset + 2..offset + 6]));
        items.push(RfidItem { sensor_index: u_index, tag_id, is_alarm: alarm });
        offset += 6;
    }

    Ok(IntermediateForm {
        device_family: DeviceFamily::B,
        device_id,
        kind: Kind::RfidSnapshot,
        message_id,
        topic: topic.to_string(),
        raw_reference: hex::encode(bytes),
        body: IfBody::RfidSnapshot { module_index, module_id, u_total: Some(u_total), items },
    })
}

fn decode_temp_hum(topic: &str, bytes: &[u8]) -> Result<IntermediateForm, DecodeError> {
    need(bytes, 5 + TEMP_HUM_SLOTS * 5 + 4)?;
    let device_id = topic_device_id(topic);
    let module_index = bytes[0] as u32;
    let module_id = module_id_hex(&bytes[1..5]);
    let message_id = message_id_from_tail(bytes)?;

    let mut items = Vec::new();
    let mut offset = 5;
    for th_index in 1..=TEMP_HUM_SLOTS as u32 {
        let addr = bytes[offset];
        let t_int = bytes[offset + 1];
        let t_frac = bytes[offset + 2];
        let h_int = bytes[offset + 3];
        let h_frac = bytes[offset + 4];
        offset += 5;

        if addr == 0 {
            continue;
        }
        items.push(ThItem {
            th_index,
            temp: decode_signed_fixed(t_int, t_frac),
            hum: decode_signed_fixed(h_int, h_frac),
        });
    }

    Ok(IntermediateForm {
        device_family: DeviceFamily::B,
        device_id,
        kind: Kind::TempHum,
        message_id,
        topic: topic.to_string(),
        raw_reference: hex::encode(bytes),
        body: IfBody::TempHum { module_index, module_id, items },
    })
}

fn decode_noise(topic: &str, bytes: &[u8]) -> Result<IntermediateForm, DecodeError> {
    need(bytes, 5 + NOISE_SLOTS * 3 + 4)?;
    let device_id = topic_device_id(topic);
    let module_index = bytes[0] as u32;
    let module_id = module_id_hex(&bytes[1..5]);
    let message_id = message_id_from_tail(bytes)?;

    let mut items = Vec::new();
    let mut offset = 5;
    for ns_index in 1..=NOISE_SLOTS as u32 {
        let addr = bytes[offset];
        let n_int = bytes[offset + 1];
        let n_frac = bytes[offset + 2];
        offset += 3;

        if addr == 0 {
            continue;
        }
        items.push(NoiseItem { ns_index, noise: decode_signed_fixed(n_int, n_frac) });
    }

    Ok(IntermediateForm {
        device_family: DeviceFamily::B,
        device_id,
        kind: Kind::NoiseLevel,
        message_id,
        topic: topic.to_string(),
        raw_reference: hex::encode(bytes),
        body: IfBody::NoiseLevel { module_index, module_id, items },
    })
}

fn decode_door_state(topic: &str, bytes: &[u8]) -> Result<IntermediateForm, DecodeError> {
    need(bytes, 1 + 1 + 4 + 1 + 4)?;
    let device_id = topic_device_id(topic);
    let module_index = bytes[1] as u32;
    let module_id = module_id_hex(&bytes[2..6]);
    let state = bytes[6] as i32;
    let message_id = message_id_from_tail(bytes)?;

    Ok(IntermediateForm {
        device_family: DeviceFamily::B,
        device_id,
        kind: Kind::DoorState,
        message_id,
        topic: topic.to_string(),
        raw_reference: hex::encode(bytes),
        body: IfBody::DoorState {
            module_index,
            module_id,
            door_state: Some(state),
            door1_state: None,
            door2_state: None,
        },
    })
}

fn decode_device_info(topic: &str, bytes: &[u8]) -> Result<IntermediateForm, DecodeError> {
    need(bytes, 2 + 2 + 4 + 4 + 4 + 4 + 6 + 4)?;
    let device_id = topic_device_id(topic);
    let message_id = message_id_from_tail(bytes)?;

    let mut offset = 4; // header(2) + model(2)
    let fw_ver = dotted_fw(&bytes[offset..offset + 4]);
    offset += 4;
    let ip = dotted_ip(&bytes[offset..offset + 4]);
    offset += 4;
    let netmask = dotted_ip(&bytes[offset..offset + 4]);
    offset += 4;
    let gateway_ip = dotted_ip(&bytes[offset..offset + 4]);
    offset += 4;
    let mac = colon_mac(&bytes[offset..offset + 6]);

    Ok(IntermediateForm {
        device_family: DeviceFamily::B,
        device_id,
        kind: Kind::DeviceMetadata,
        message_id,
        topic: topic.to_string(),
        raw_reference: hex::encode(bytes),
        body: IfBody::DeviceInfo { fw_ver, ip, netmask, gateway_ip, mac },
    })
}

fn decode_module_info(topic: &str, bytes: &[u8]) -> Result<IntermediateForm, DecodeError> {
    need(bytes, 6)?;
    if (bytes.len() - 6) % 5 != 0 {
        return Err(DecodeError::OutOfRange { field: "module_info.len".to_string(), value: bytes.len() as i64 });
    }
    let n = (bytes.len() - 6) / 5;
    let device_id = topic_device_id(topic);
    let message_id = message_id_from_tail(bytes)?;

    let mut modules = Vec::with_capacity(n);
    let mut offset = 2;
    for _ in 0..n {
        let module_index = bytes[offset] as u32;
        let fw_ver = dotted_fw(&bytes[offset + 1..offset + 5]);
        modules.push(ModuleFwEntry { module_index, fw_ver });
        offset += 5;
    }

    Ok(IntermediateForm {
        device_family: DeviceFamily::B,
        device_id,
        kind: Kind::DeviceMetadata,
        message_id,
        topic: topic.to_string(),
        raw_reference: hex::encode(bytes),
        body: IfBody::ModuleInfo { modules },
    })
}

fn decode_command_response(topic: &str, bytes: &[u8]) -> Result<IntermediateForm, DecodeError> {
    need(bytes, 7)?;
    let device_id = be_u32(&bytes[1..5]).to_string();
    let result = match bytes[5] {
        0xA1 => CmdResult::Success,
        0xA0 => CmdResult::Failure,
        other => return Err(DecodeError::OutOfRange { field: "result".to_string(), value: other as i64 }),
    };
    let command_code = bytes[6];
    let message_id = message_id_from_tail(bytes)?;

    match command_code {
        0xE4 => {
            need(bytes, 6 + 2 + 4)?;
            let original_req = bytes[6..8].to_vec();
            let module_index = original_req[1] as u32;
            let payload_bytes = &bytes[8..bytes.len() - 4];
            let color_map = payload_bytes
                .iter()
                .enumerate()
                .map(|(i, code)| ColorEntry { sensor_index: i as u32 + 1, color_code: *code as u32 })
                .collect();

            Ok(IntermediateForm {
                device_family: DeviceFamily::B,
                device_id,
                kind: Kind::QryColorResp,
                message_id,
                topic: topic.to_string(),
                raw_reference: hex::encode(bytes),
                body: IfBody::CommandResponse { module_index, result, original_req, color_map: Some(color_map) },
            })
        }
        0xE1 | 0xE2 => {
            need(bytes, 10)?;
            let echo_len = bytes.len() - 10;
            let original_req = bytes[6..6 + echo_len].to_vec();
            let module_index = original_req.get(1).copied().unwrap_or(0) as u32;
            let kind = if command_code == 0xE1 { Kind::SetColorResp } else { Kind::ClearAlarmResp };

            Ok(IntermediateForm {
                device_family: DeviceFamily::B,
                device_id,
                kind,
                message_id,
                topic: topic.to_string(),
                raw_reference: hex::encode(bytes),
                body: IfBody::CommandResponse { module_index, result, original_req, color_map: None },
            })
        }
        other => Err(DecodeError::UnrecognizedFrame { topic: topic.to_string(), first_byte: Some(other) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_fixed_point_null_on_zero_pair() {
        assert_eq!(decode_signed_fixed(0x00, 0x00), None);
    }

    #[test]
    fn signed_fixed_point_positive() {
        assert_eq!(decode_signed_fixed(0x18, 0x30), Some(24.48));
    }

    #[test]
    fn signed_fixed_point_negative() {
        assert_eq!(decode_signed_fixed(0x85, 0x19), Some(-5.25));
    }

    fn heartbeat_frame() -> Vec<u8> {
        let mut frame = vec![0xCC];
        // slot 1: moduleIndex=1, moduleId=0x00000001, uTotal=6
        frame.push(1);
        frame.extend_from_slice(&1u32.to_be_bytes());
        frame.push(6);
        // remaining 9 slots empty (moduleId = 0 => skipped)
        for _ in 0..9 {
            frame.push(0);
            frame.extend_from_slice(&0u32.to_be_bytes());
            frame.push(0);
        }
        frame.extend_from_slice(&42u32.to_be_bytes());
        frame
    }

    #[test]
    fn decodes_heartbeat_and_skips_empty_slots() {
        let frame = heartbeat_frame();
        let result = decode("BUpload/dev-1/Heartbeat", &frame).unwrap().unwrap();
        assert_eq!(result.kind, Kind::Heartbeat);
        match result.body {
            IfBody::Heartbeat { modules } => {
                assert_eq!(modules.len(), 1);
                assert_eq!(modules[0].module_index, 1);
                assert_eq!(modules[0].u_total, 6);
            }
            _ => panic!("wrong body"),
        }
    }

    #[test]
    fn unrecognized_frame_returns_none_not_error() {
        let frame = vec![0xFF, 0xFF];
        let result = decode("BUpload/dev-1/Weird", &frame).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn rfid_snapshot_count_zero_is_a_valid_empty_snapshot() {
        let mut frame = vec![0xBB, 1];
        frame.extend_from_slice(&1u32.to_be_bytes()); // moduleId
        frame.push(0); // reserved
        frame.push(24); // uTotal
        frame.push(0); // count = 0
        frame.extend_from_slice(&7u32.to_be_bytes()); // messageId

        let result = decode("BUpload/dev-1/LabelState", &frame).unwrap().unwrap();
        match result.body {
            IfBody::RfidSnapshot { items, .. } => assert!(items.is_empty()),
            _ => panic!("wrong body"),
        }
    }
}
