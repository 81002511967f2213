//! Translates an abstract `CommandRequest` into FamilyB bytes or a
//! FamilyJ JSON envelope, publishable on `${family}Download/${deviceId}`.

use serde_json::json;

use crate::command::domain::{BuiltCommand, CommandBuildError, OutboundFrame};
use crate::model::domain::{CommandKind, CommandRequest, DeviceFamily};

const MODULE_SCOPED: &[CommandKind] = &[
    CommandKind::QryRfidSnapshot,
    CommandKind::QryTempHum,
    CommandKind::QryDoorState,
    CommandKind::QryNoiseLevel,
    CommandKind::QryColor,
    CommandKind::SetColor,
    CommandKind::ClearAlarm,
];

fn topic_for(device_family: DeviceFamily, device_id: &str) -> String {
    let family = match device_family {
        DeviceFamily::B => "B",
        DeviceFamily::J => "J",
    };
    format!("{family}Download/{device_id}")
}

pub fn build(command: &CommandRequest) -> Result<BuiltCommand, CommandBuildError> {
    if command.device_id.is_empty() {
        return Err(CommandBuildError::MissingDeviceId);
    }
    if MODULE_SCOPED.contains(&command.kind) && command.module_index.is_none() {
        return Err(CommandBuildError::MissingModuleIndex(command.kind));
    }
    if command.kind == CommandKind::SetColor
        && command.color_items.as_ref().map(|v| v.is_empty()).unwrap_or(true)
        && (command.sensor_index.is_none() || command.color_code.is_none())
    {
        return Err(CommandBuildError::MissingColorFields);
    }
    if command.device_family == DeviceFamily::J
        && command.kind == CommandKind::QryRfidSnapshot
        && command.module_id.is_none()
    {
        return Err(CommandBuildError::MissingModuleId);
    }

    let topic = topic_for(command.device_family, &command.device_id);
    let frame = match command.device_family {
        DeviceFamily::B => build_family_b(command)?,
        DeviceFamily::J => build_family_j(command)?,
    };

    Ok(BuiltCommand { topic, frame })
}

fn build_family_b(command: &CommandRequest) -> Result<OutboundFrame, CommandBuildError> {
    let module_index = command.module_index.unwrap_or(0) as u8;
    let bytes = match command.kind {
        CommandKind::QryRfidSnapshot => vec![0xE9, 0x01, module_index],
        CommandKind::QryTempHum => vec![0xE9, 0x02, module_index],
        CommandKind::QryDoorState => vec![0xE9, 0x03, module_index],
        CommandKind::QryNoiseLevel => vec![0xE9, 0x04, module_index],
        CommandKind::QryDeviceInfo => vec![0xEF, 0x01, 0x00],
        CommandKind::QryModuleInfo => vec![0xEF, 0x02, 0x00],
        CommandKind::QryColor => vec![0xE4, module_index],
        CommandKind::ClearAlarm => {
            let sensor_index = command.sensor_index.unwrap_or(0) as u8;
            vec![0xE2, module_index, sensor_index]
        }
        CommandKind::SetColor => {
            let mut bytes = vec![0xE1, module_index];
            match &command.color_items {
                Some(items) if !items.is_empty() => {
                    for item in items {
                        bytes.push(item.sensor_index as u8);
                        bytes.push(item.color_code as u8);
                    }
                }
                _ => {
                    bytes.push(command.sensor_index.unwrap_or(0) as u8);
                    bytes.push(command.color_code.unwrap_or(0) as u8);
                }
            }
            bytes
        }
        CommandKind::QryDevModInfo => return Err(CommandBuildError::UnsupportedForFamily(command.kind)),
    };
    Ok(OutboundFrame::Bytes(bytes))
}

fn build_family_j(command: &CommandRequest) -> Result<OutboundFrame, CommandBuildError> {
    let module_index = command.module_index;
    let module_id = command.module_id.clone();

    let value = match command.kind {
        CommandKind::QryRfidSnapshot => json!({
            "msg_type": "u_state_req",
            "data": [{
                "host_gateway_port_index": module_index,
                "extend_module_sn": module_id,
                "u_index_list": serde_json::Value::Null,
            }],
        }),
        CommandKind::QryTempHum => json!({
            "msg_type": "temper_humidity_req",
            "data": [{ "host_gateway_port_index": module_index, "extend_module_sn": module_id }],
        }),
        CommandKind::QryDoorState => json!({
            "msg_type": "door_state_req",
            "data": [{ "host_gateway_port_index": module_index, "extend_module_sn": module_id }],
        }),
        CommandKind::QryColor => json!({
            "msg_type": "u_color",
            "data": [{ "host_gateway_port_index": module_index }],
        }),
        CommandKind::SetColor => {
            let color_data = match &command.color_items {
                Some(items) if !items.is_empty() => items
                    .iter()
                    .map(|i| json!({ "u_index": i.sensor_index, "color_code": i.color_code }))
                    .collect::<Vec<_>>(),
                _ => vec![json!({
                    "u_index": command.sensor_index,
                    "color_code": command.color_code,
                })],
            };
            json!({
                "msg_type": "set_module_property_req",
                "set_property_type": 8001,
                "data": [{ "host_gateway_port_index": module_index, "u_color_data": color_data }],
            })
        }
        CommandKind::ClearAlarm => json!({
            "msg_type": "clear_u_warning",
            "data": [{ "index": module_index, "warning_data": [command.sensor_index] }],
        }),
        CommandKind::QryDevModInfo => json!({
            "msg_type": "devies_init_req",
            "data": serde_json::Value::Null,
        }),
        CommandKind::QryNoiseLevel | CommandKind::QryDeviceInfo | CommandKind::QryModuleInfo => {
            return Err(CommandBuildError::UnsupportedForFamily(command.kind));
        }
    };

    Ok(OutboundFrame::Json(value))
}

/// Drains outbound command requests off the bus, builds each into a
/// publishable frame, and forwards it to the broker. Build failures are
/// surfaced on the `error` topic rather than dropped silently.
pub async fn command_builder_task(
    bus: crate::bus::domain::EventBus,
    outbound: tokio::sync::mpsc::Sender<BuiltCommand>,
) {
    let Some(mut rx) = bus.take_command_receiver().await else {
        tracing::error!("command builder task could not acquire the command receiver");
        return;
    };

    while let Some(command) = rx.recv().await {
        match build(&command) {
            Ok(built) => {
                if outbound.send(built).await.is_err() {
                    tracing::warn!("broker outbound channel closed, dropping command");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "command build failed");
                bus.publish_error(crate::bus::domain::ErrorEvent {
                    component: "command_builder",
                    message: e.to_string(),
                });
            }
        }
    }
}

pub fn start_command_builder(bus: crate::bus::domain::EventBus, outbound: tokio::sync::mpsc::Sender<BuiltCommand>) {
    tokio::spawn(async move {
        command_builder_task(bus, outbound).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::domain::ColorEntry;

    fn base_command(kind: CommandKind, device_family: DeviceFamily) -> CommandRequest {
        CommandRequest {
            device_id: "dev-1".to_string(),
            device_family,
            kind,
            module_index: Some(1),
            module_id: Some("A".to_string()),
            sensor_index: Some(3),
            color_code: Some(5),
            color_items: None,
        }
    }

    #[test]
    fn family_b_qry_rfid_snapshot_matches_byte_layout() {
        let command = base_command(CommandKind::QryRfidSnapshot, DeviceFamily::B);
        let built = build(&command).unwrap();
        assert_eq!(built.topic, "BDownload/dev-1");
        assert_eq!(built.frame, OutboundFrame::Bytes(vec![0xE9, 0x01, 1]));
    }

    #[test]
    fn family_b_set_color_with_multiple_items() {
        let mut command = base_command(CommandKind::SetColor, DeviceFamily::B);
        command.color_items = Some(vec![
            ColorEntry { sensor_index: 1, color_code: 2 },
            ColorEntry { sensor_index: 3, color_code: 4 },
        ]);
        let built = build(&command).unwrap();
        assert_eq!(built.frame, OutboundFrame::Bytes(vec![0xE1, 1, 1, 2, 3, 4]));
    }

    #[test]
    fn missing_module_index_fails_validation() {
        let mut command = base_command(CommandKind::QryTempHum, DeviceFamily::B);
        command.module_index = None;
        assert!(matches!(build(&command), Err(CommandBuildError::MissingModuleIndex(_))));
    }

    #[test]
    fn family_j_rfid_snapshot_requires_module_id() {
        let mut command = base_command(CommandKind::QryRfidSnapshot, DeviceFamily::J);
        command.module_id = None;
        assert!(matches!(build(&command), Err(CommandBuildError::MissingModuleId)));
    }

    #[test]
    fn family_j_set_color_envelope_shape() {
        let command = base_command(CommandKind::SetColor, DeviceFamily::J);
        let built = build(&command).unwrap();
        match built.frame {
            OutboundFrame::Json(value) => assert_eq!(value["msg_type"], "set_module_property_req"),
            _ => panic!("expected JSON frame"),
        }
    }

    #[test]
    fn device_level_command_does_not_need_module_index() {
        let mut command = base_command(CommandKind::QryDeviceInfo, DeviceFamily::B);
        command.module_index = None;
        let built = build(&command).unwrap();
        assert_eq!(built.frame, OutboundFrame::Bytes(vec![0xEF, 0x01, 0x00]));
    }
}
