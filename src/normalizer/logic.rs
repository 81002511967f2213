//! The normalizer: `IntermediateForm` in, shadow mutation plus
//! `NormalizerOutput` out. One function per `Kind`, matching the per-kind
//! contracts  verbatim. This is the only place besides
//! `shadow::logic` that mutates the shadow, and it always does so through
//! `shadow::logic::merge`/`reconcile` for the metadata entry.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use tracing::warn;

use crate::model::domain::{
    sensor_index, CmdResult, ColorEntry, CommandKind, CommandRequest, DeviceFamily, HeartbeatSlot, IfBody,
    IntermediateForm, Kind, ModuleFwEntry, ModuleMetaEntry, NoiseItem, NormalizedEvent, PayloadRecord, RfidAction,
    RfidItem, ThItem,
};
use crate::normalizer::domain::{NormalizerOutput, DOOR_INDEX_RANGE, HEARTBEAT_INDEX_RANGE};
use crate::shadow::domain::{MetadataEntry, NoiseReading, RfidReading, Shadow, ThReading};
use crate::shadow::logic::{merge, reconcile, MergeInput};
use crate::warmup::domain::{HeartbeatSnapshot, ModuleSnapshot, WarmupConfig};
use crate::warmup::logic::plan as plan_warmup;

/// Dispatches one `IntermediateForm` to its per-kind handler.
pub fn normalize(ifo: IntermediateForm, shadow: &Shadow, warmup_config: &WarmupConfig) -> NormalizerOutput {
    match ifo.body {
        IfBody::Heartbeat { ref modules } => normalize_heartbeat(&ifo, modules, shadow, warmup_config),
        IfBody::RfidSnapshot { module_index, ref module_id, ref items, .. } => {
            normalize_rfid_snapshot(&ifo, module_index, module_id, items, shadow)
        }
        IfBody::RfidEvent { module_index, ref module_id, sensor_index, .. } => {
            normalize_rfid_event_inbound(&ifo, module_index, module_id, sensor_index)
        }
        IfBody::TempHum { module_index, ref module_id, ref items } => {
            normalize_temp_hum(&ifo, module_index, module_id, items, shadow)
        }
        IfBody::NoiseLevel { module_index, ref module_id, ref items } => {
            normalize_noise(&ifo, module_index, module_id, items, shadow)
        }
        IfBody::DoorState { module_index, ref module_id, door_state, door1_state, door2_state } => {
            normalize_door_state(&ifo, module_index, module_id, door_state, door1_state, door2_state, shadow)
        }
        IfBody::DeviceInfo { ref fw_ver, ref ip, ref netmask, ref gateway_ip, ref mac } => {
            normalize_device_info(&ifo, fw_ver, ip, netmask, gateway_ip, mac, shadow)
        }
        IfBody::ModuleInfo { ref modules } => normalize_module_info(&ifo, modules, shadow),
        IfBody::DevModInfo { ref ip, ref mac, ref fw_ver, ref modules } => {
            normalize_dev_mod_info(&ifo, ip, mac, fw_ver, modules, shadow)
        }
        IfBody::UtotalChanged { ref modules } => normalize_utotal_changed(&ifo, modules, shadow),
        IfBody::CommandResponse { module_index, result, ref original_req, ref color_map } => {
            normalize_command_response(&ifo, module_index, result, original_req, color_map)
        }
        IfBody::Unknown { .. } => NormalizerOutput::default(),
    }
}

fn device_metadata_event(entry: &MetadataEntry, message_id: &str) -> NormalizedEvent {
    let payload = entry
        .active_modules
        .iter()
        .map(|m| PayloadRecord::Raw(serde_json::to_value(m).unwrap_or(serde_json::Value::Null)))
        .collect();

    let mut event = NormalizedEvent::device_level(
        entry.device_id.clone(),
        entry.device_family,
        Kind::DeviceMetadata,
        message_id.to_string(),
        payload,
    );
    event.ip = entry.ip.clone();
    event.mac = entry.mac.clone();
    event.fw_ver = entry.fw_ver.clone();
    event.netmask = entry.netmask.clone();
    event.gateway_ip = entry.gateway_ip.clone();
    event
}

fn meta_changed_event(entry: &MetadataEntry, message_id: &str, changes: Vec<String>) -> NormalizedEvent {
    let payload = changes.into_iter().map(|description| PayloadRecord::MetaChanged { description }).collect();
    NormalizedEvent::device_level(
        entry.device_id.clone(),
        entry.device_family,
        Kind::MetaChangedEvent,
        message_id.to_string(),
        payload,
    )
}

fn normalize_heartbeat(
    ifo: &IntermediateForm,
    modules: &[HeartbeatSlot],
    shadow: &Shadow,
    warmup_config: &WarmupConfig,
) -> NormalizerOutput {
    let now = Utc::now();
    let valid: Vec<&HeartbeatSlot> =
        modules.iter().filter(|m| m.module_id != "0" && HEARTBEAT_INDEX_RANGE.contains(&m.module_index)).collect();

    for slot in &valid {
        let mut entry =
            shadow.telemetry_entry(&ifo.device_id, ifo.device_family, slot.module_index, &slot.module_id);
        entry.is_online = true;
        entry.last_seen_heartbeat = Some(now);
        entry.module_id = slot.module_id.clone();
        entry.u_total = Some(slot.u_total);
    }

    let heartbeat_modules: Vec<(u32, String, u32)> =
        valid.iter().map(|m| (m.module_index, m.module_id.clone(), m.u_total)).collect();

    let mut metadata_entry = shadow.metadata_entry(&ifo.device_id, ifo.device_family);
    let changes = reconcile(&mut metadata_entry, &heartbeat_modules);

    let mut output = NormalizerOutput::default();

    let heartbeat_payload = valid
        .iter()
        .map(|m| PayloadRecord::Heartbeat {
            module_index: m.module_index,
            module_id: m.module_id.clone(),
            u_total: m.u_total,
        })
        .collect();
    output.push_event(NormalizedEvent::device_level(
        ifo.device_id.clone(),
        ifo.device_family,
        Kind::Heartbeat,
        ifo.message_id.clone(),
        heartbeat_payload,
    ));

    if !changes.is_empty() {
        output.push_event(meta_changed_event(&metadata_entry, &ifo.message_id, changes));
    }
    output.push_event(device_metadata_event(&metadata_entry, &ifo.message_id));

    let snapshot = HeartbeatSnapshot {
        device_id: ifo.device_id.clone(),
        device_family: ifo.device_family,
        ip: metadata_entry.ip.clone(),
        mac: metadata_entry.mac.clone(),
        modules: valid
            .iter()
            .map(|slot| {
                let fw_ver = metadata_entry
                    .active_modules
                    .iter()
                    .find(|m| m.module_index == slot.module_index)
                    .and_then(|m| m.fw_ver.clone());
                let telemetry = shadow.telemetry_get(&ifo.device_id, slot.module_index);
                ModuleSnapshot {
                    module_index: slot.module_index,
                    module_id: slot.module_id.clone(),
                    fw_ver,
                    temp_hum_empty: telemetry.as_ref().map(|t| t.temp_hum.is_empty()).unwrap_or(true),
                    last_seen_temp_hum: telemetry.as_ref().and_then(|t| t.last_seen_temp_hum),
                    rfid_empty: telemetry.as_ref().map(|t| t.rfid.is_empty()).unwrap_or(true),
                    last_seen_rfid: telemetry.as_ref().and_then(|t| t.last_seen_rfid),
                    door_state: telemetry.as_ref().and_then(|t| t.door_state),
                    door1_state: telemetry.as_ref().and_then(|t| t.door1_state),
                }
            })
            .collect(),
    };
    output.push_commands(plan_warmup(&snapshot, warmup_config));

    output
}

fn normalize_rfid_snapshot(
    ifo: &IntermediateForm,
    module_index: u32,
    module_id: &str,
    items: &[RfidItem],
    shadow: &Shadow,
) -> NormalizerOutput {
    let now = Utc::now();
    let new_map: HashMap<u32, (String, bool)> =
        items.iter().map(|i| (i.sensor_index, (i.tag_id.clone(), i.is_alarm))).collect();

    let prior = shadow.telemetry_get(&ifo.device_id, module_index);
    let prior_map: HashMap<u32, (String, bool)> = prior
        .as_ref()
        .map(|t| t.rfid.iter().map(|r| (r.sensor_index, (r.tag_id.clone(), r.is_alarm))).collect())
        .unwrap_or_default();

    let all_indices: BTreeSet<u32> = new_map.keys().copied().chain(prior_map.keys().copied()).collect();

    let mut detach_events = Vec::new();
    let mut attach_events = Vec::new();
    let mut alarm_events = Vec::new();

    for sensor_index in all_indices {
        let new = new_map.get(&sensor_index);
        let old = prior_map.get(&sensor_index);
        match (new, old) {
            (Some((tag_id, is_alarm)), None) => attach_events.push(PayloadRecord::RfidEvent {
                sensor_index,
                tag_id: tag_id.clone(),
                action: RfidAction::Attached,
                is_alarm: *is_alarm,
            }),
            (None, Some((tag_id, is_alarm))) => detach_events.push(PayloadRecord::RfidEvent {
                sensor_index,
                tag_id: tag_id.clone(),
                action: RfidAction::Detached,
                is_alarm: *is_alarm,
            }),
            (Some((new_tag, new_alarm)), Some((old_tag, old_alarm))) => {
                if new_tag != old_tag {
                    detach_events.push(PayloadRecord::RfidEvent {
                        sensor_index,
                        tag_id: old_tag.clone(),
                        action: RfidAction::Detached,
                        is_alarm: *old_alarm,
                    });
                    attach_events.push(PayloadRecord::RfidEvent {
                        sensor_index,
                        tag_id: new_tag.clone(),
                        action: RfidAction::Attached,
                        is_alarm: *new_alarm,
                    });
                } else if new_alarm != old_alarm {
                    let action = if *new_alarm { RfidAction::AlarmOn } else { RfidAction::AlarmOff };
                    alarm_events.push(PayloadRecord::RfidEvent {
                        sensor_index,
                        tag_id: new_tag.clone(),
                        action,
                        is_alarm: *new_alarm,
                    });
                }
            }
            (None, None) => unreachable!("index came from one of the two maps"),
        }
    }

    let mut output = NormalizerOutput::default();

    let mut rfid_event_payload = Vec::new();
    rfid_event_payload.extend(detach_events);
    rfid_event_payload.extend(attach_events);
    rfid_event_payload.extend(alarm_events);
    if !rfid_event_payload.is_empty() {
        output.push_event(NormalizedEvent::module_scoped(
            ifo.device_id.clone(),
            ifo.device_family,
            Kind::RfidEvent,
            ifo.message_id.clone(),
            module_index,
            module_id.to_string(),
            rfid_event_payload,
        ));
    }

    let snapshot_payload = items
        .iter()
        .map(|i| PayloadRecord::RfidSnapshotItem {
            sensor_index: i.sensor_index,
            tag_id: i.tag_id.clone(),
            is_alarm: i.is_alarm,
        })
        .collect();
    output.push_event(NormalizedEvent::module_scoped(
        ifo.device_id.clone(),
        ifo.device_family,
        Kind::RfidSnapshot,
        ifo.message_id.clone(),
        module_index,
        module_id.to_string(),
        snapshot_payload,
    ));

    let mut entry = shadow.telemetry_entry(&ifo.device_id, ifo.device_family, module_index, module_id);
    entry.rfid = items.iter().map(|i| RfidReading { sensor_index: i.sensor_index, tag_id: i.tag_id.clone(), is_alarm: i.is_alarm }).collect();
    entry.last_seen_rfid = Some(now);

    output
}

/// FamilyB never reaches this entry point (its RFID_EVENTs are always
/// synthesized by diffing snapshots). FamilyJ requests a snapshot rather
/// than trusting the notification directly
fn normalize_rfid_event_inbound(
    ifo: &IntermediateForm,
    module_index: u32,
    module_id: &str,
    _sensor_index: u32,
) -> NormalizerOutput {
    match ifo.device_family {
        DeviceFamily::B => NormalizerOutput::default(),
        DeviceFamily::J => NormalizerOutput {
            events: Vec::new(),
            commands: vec![CommandRequest {
                device_id: ifo.device_id.clone(),
                device_family: ifo.device_family,
                kind: CommandKind::QryRfidSnapshot,
                module_index: Some(module_index),
                module_id: Some(module_id.to_string()),
                sensor_index: None,
                color_code: None,
                color_items: None,
            }],
        },
    }
}

fn normalize_temp_hum(
    ifo: &IntermediateForm,
    module_index: u32,
    module_id: &str,
    items: &[ThItem],
    shadow: &Shadow,
) -> NormalizerOutput {
    let now = Utc::now();
    let kept: Vec<ThReading> = items
        .iter()
        .filter(|i| i.temp.is_some() || i.hum.is_some())
        .map(|i| ThReading { sensor_index: sensor_index::temp_hum_index(i.th_index), temp: i.temp, hum: i.hum })
        .collect();

    let payload = kept.iter().map(|r| PayloadRecord::TempHum { sensor_index: r.sensor_index, temp: r.temp, hum: r.hum }).collect();

    let mut entry = shadow.telemetry_entry(&ifo.device_id, ifo.device_family, module_index, module_id);
    entry.temp_hum = kept;
    entry.last_seen_temp_hum = Some(now);
    drop(entry);

    NormalizerOutput::with_event(NormalizedEvent::module_scoped(
        ifo.device_id.clone(),
        ifo.device_family,
        Kind::TempHum,
        ifo.message_id.clone(),
        module_index,
        module_id.to_string(),
        payload,
    ))
}

fn normalize_noise(
    ifo: &IntermediateForm,
    module_index: u32,
    module_id: &str,
    items: &[NoiseItem],
    shadow: &Shadow,
) -> NormalizerOutput {
    let now = Utc::now();
    let kept: Vec<NoiseReading> = items
        .iter()
        .filter(|i| i.noise.is_some())
        .map(|i| NoiseReading { sensor_index: sensor_index::noise_index(i.ns_index), noise: i.noise })
        .collect();

    let payload = kept.iter().map(|r| PayloadRecord::Noise { sensor_index: r.sensor_index, noise: r.noise }).collect();

    let mut entry = shadow.telemetry_entry(&ifo.device_id, ifo.device_family, module_index, module_id);
    entry.noise = kept;
    entry.last_seen_noise = Some(now);
    drop(entry);

    NormalizerOutput::with_event(NormalizedEvent::module_scoped(
        ifo.device_id.clone(),
        ifo.device_family,
        Kind::NoiseLevel,
        ifo.message_id.clone(),
        module_index,
        module_id.to_string(),
        payload,
    ))
}

fn normalize_door_state(
    ifo: &IntermediateForm,
    module_index: u32,
    module_id: &str,
    door_state: Option<i32>,
    door1_state: Option<i32>,
    door2_state: Option<i32>,
    shadow: &Shadow,
) -> NormalizerOutput {
    if !DOOR_INDEX_RANGE.contains(&module_index) || module_id == "0" {
        warn!(device_id = %ifo.device_id, module_index, "dropping DOOR_STATE with invalid module scope");
        return NormalizerOutput::default();
    }

    let now = Utc::now();
    let mut entry = shadow.telemetry_entry(&ifo.device_id, ifo.device_family, module_index, module_id);
    entry.door_state = door_state;
    entry.door1_state = door1_state;
    entry.door2_state = door2_state;
    entry.last_seen_door = Some(now);
    drop(entry);

    let payload = vec![PayloadRecord::Door { door_state, door1_state, door2_state }];
    NormalizerOutput::with_event(NormalizedEvent::module_scoped(
        ifo.device_id.clone(),
        ifo.device_family,
        Kind::DoorState,
        ifo.message_id.clone(),
        module_index,
        module_id.to_string(),
        payload,
    ))
}

fn normalize_device_info(
    ifo: &IntermediateForm,
    fw_ver: &str,
    ip: &str,
    netmask: &str,
    gateway_ip: &str,
    mac: &str,
    shadow: &Shadow,
) -> NormalizerOutput {
    let mut entry = shadow.metadata_entry(&ifo.device_id, ifo.device_family);
    let changes = merge(
        &mut entry,
        MergeInput {
            ip: Some(ip.to_string()),
            mac: Some(mac.to_string()),
            fw_ver: Some(fw_ver.to_string()),
            netmask: Some(netmask.to_string()),
            gateway_ip: Some(gateway_ip.to_string()),
            modules: Vec::new(),
        },
    );
    finish_metadata_merge(ifo, &entry, changes)
}

fn normalize_module_info(ifo: &IntermediateForm, modules: &[ModuleFwEntry], shadow: &Shadow) -> NormalizerOutput {
    let mut entry = shadow.metadata_entry(&ifo.device_id, ifo.device_family);
    let changes = merge(
        &mut entry,
        MergeInput {
            modules: modules
                .iter()
                .map(|m| ModuleMetaEntry {
                    module_index: m.module_index,
                    module_id: None,
                    fw_ver: Some(m.fw_ver.clone()),
                    u_total: None,
                })
                .collect(),
            ..Default::default()
        },
    );
    finish_metadata_merge(ifo, &entry, changes)
}

fn normalize_dev_mod_info(
    ifo: &IntermediateForm,
    ip: &Option<String>,
    mac: &Option<String>,
    fw_ver: &Option<String>,
    modules: &[ModuleMetaEntry],
    shadow: &Shadow,
) -> NormalizerOutput {
    let mut entry = shadow.metadata_entry(&ifo.device_id, ifo.device_family);
    let changes = merge(
        &mut entry,
        MergeInput { ip: ip.clone(), mac: mac.clone(), fw_ver: fw_ver.clone(), modules: modules.to_vec(), ..Default::default() },
    );
    finish_metadata_merge(ifo, &entry, changes)
}

fn normalize_utotal_changed(ifo: &IntermediateForm, modules: &[ModuleMetaEntry], shadow: &Shadow) -> NormalizerOutput {
    let mut entry = shadow.metadata_entry(&ifo.device_id, ifo.device_family);
    let changes = merge(&mut entry, MergeInput { modules: modules.to_vec(), ..Default::default() });
    finish_metadata_merge(ifo, &entry, changes)
}

fn finish_metadata_merge(ifo: &IntermediateForm, entry: &MetadataEntry, changes: Vec<String>) -> NormalizerOutput {
    let mut output = NormalizerOutput::default();
    if !changes.is_empty() {
        output.push_event(meta_changed_event(entry, &ifo.message_id, changes));
    }
    output.push_event(device_metadata_event(entry, &ifo.message_id));
    output
}

fn normalize_command_response(
    ifo: &IntermediateForm,
    module_index: u32,
    result: CmdResult,
    original_req: &[u8],
    color_map: &Option<Vec<ColorEntry>>,
) -> NormalizerOutput {
    let payload = vec![PayloadRecord::CommandResult {
        module_index,
        result,
        original_req: hex::encode(original_req),
        color_map: color_map.clone(),
    }];
    NormalizerOutput::with_event(NormalizedEvent::device_level(
        ifo.device_id.clone(),
        ifo.device_family,
        ifo.kind,
        ifo.message_id.clone(),
        payload,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat_ifo(device_id: &str, modules: Vec<HeartbeatSlot>) -> IntermediateForm {
        IntermediateForm {
            device_family: DeviceFamily::B,
            device_id: device_id.to_string(),
            kind: Kind::Heartbeat,
            message_id: "1".to_string(),
            topic: "BUpload/dev/Heartbeat".to_string(),
            raw_reference: String::new(),
            body: IfBody::Heartbeat { modules },
        }
    }

    #[test]
    fn heartbeat_emits_device_level_event_and_triggers_self_healing() {
        let shadow = Shadow::new();
        let ifo = heartbeat_ifo("dev-1", vec![HeartbeatSlot { module_index: 1, module_id: "A".into(), u_total: 6 }]);

        let output = normalize(ifo, &shadow, &WarmupConfig::default());

        assert!(output.events.iter().any(|e| e.kind == Kind::Heartbeat && e.module_index == 0));
        assert!(output.commands.iter().any(|c| c.kind == CommandKind::QryDeviceInfo));
    }

    #[test]
    fn rfid_snapshot_diff_emits_detach_before_attach() {
        let shadow = Shadow::new();
        let mut first = shadow.telemetry_entry("dev-1", DeviceFamily::B, 1, "A");
        first.rfid = vec![RfidReading { sensor_index: 3, tag_id: "OLD".into(), is_alarm: false }];
        drop(first);

        let ifo = IntermediateForm {
            device_family: DeviceFamily::B,
            device_id: "dev-1".to_string(),
            kind: Kind::RfidSnapshot,
            message_id: "2".to_string(),
            topic: "t".to_string(),
            raw_reference: String::new(),
            body: IfBody::RfidSnapshot {
                module_index: 1,
                module_id: "A".to_string(),
                u_total: Some(6),
                items: vec![RfidItem { sensor_index: 3, tag_id: "NEW".into(), is_alarm: false }],
            },
        };

        let output = normalize(ifo, &shadow, &WarmupConfig::default());
        let event = output.events.iter().find(|e| e.kind == Kind::RfidEvent).unwrap();
        match (&event.payload[0], &event.payload[1]) {
            (PayloadRecord::RfidEvent { action: a0, .. }, PayloadRecord::RfidEvent { action: a1, .. }) => {
                assert_eq!(*a0, RfidAction::Detached);
                assert_eq!(*a1, RfidAction::Attached);
            }
            _ => panic!("wrong payload shape"),
        }
    }

    #[test]
    fn rfid_event_inbound_for_family_j_requests_snapshot_without_emitting() {
        let ifo = IntermediateForm {
            device_family: DeviceFamily::J,
            device_id: "dev-1".to_string(),
            kind: Kind::RfidEvent,
            message_id: "3".to_string(),
            topic: "t".to_string(),
            raw_reference: String::new(),
            body: IfBody::RfidEvent { module_index: 1, module_id: "A".into(), sensor_index: 5, action: None },
        };
        let shadow = Shadow::new();

        let output = normalize(ifo, &shadow, &WarmupConfig::default());

        assert!(output.events.is_empty());
        assert_eq!(output.commands.len(), 1);
        assert_eq!(output.commands[0].kind, CommandKind::QryRfidSnapshot);
    }

    #[test]
    fn door_state_outside_valid_range_is_dropped() {
        let shadow = Shadow::new();
        let ifo = IntermediateForm {
            device_family: DeviceFamily::B,
            device_id: "dev-1".to_string(),
            kind: Kind::DoorState,
            message_id: "4".to_string(),
            topic: "t".to_string(),
            raw_reference: String::new(),
            body: IfBody::DoorState { module_index: 9, module_id: "A".into(), door_state: Some(1), door1_state: None, door2_state: None },
        };

        let output = normalize(ifo, &shadow, &WarmupConfig::default());
        assert!(output.events.is_empty());
    }

    #[test]
    fn temp_hum_drops_entries_with_both_values_null() {
        let shadow = Shadow::new();
        let ifo = IntermediateForm {
            device_family: DeviceFamily::B,
            device_id: "dev-1".to_string(),
            kind: Kind::TempHum,
            message_id: "5".to_string(),
            topic: "t".to_string(),
            raw_reference: String::new(),
            body: IfBody::TempHum {
                module_index: 1,
                module_id: "A".into(),
                items: vec![ThItem { th_index: 1, temp: None, hum: None }, ThItem { th_index: 2, temp: Some(20.0), hum: None }],
            },
        };

        let output = normalize(ifo, &shadow, &WarmupConfig::default());
        match &output.events[0].payload[..] {
            [PayloadRecord::TempHum { sensor_index, .. }] => assert_eq!(*sensor_index, sensor_index::temp_hum_index(2)),
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
