//! Self-healing + warmup decision logic and staggered dispatch. `plan` is
//! pure and synchronous (no shadow access, no I/O);
//! `dispatch_staggered` is the only part of this module that touches a
//! channel or the clock, and it never coalesces across calls — each
//! heartbeat gets its own independently-planned, independently-staggered
//! run, matching the "a new heartbeat may arrive mid-stagger" clause.

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::model::domain::{CommandKind, CommandRequest, DeviceFamily};
use crate::warmup::domain::{HeartbeatSnapshot, WarmupConfig};

fn device_command(device_id: &str, device_family: DeviceFamily, kind: CommandKind) -> CommandRequest {
    CommandRequest {
        device_id: device_id.to_string(),
        device_family,
        kind,
        module_index: None,
        module_id: None,
        sensor_index: None,
        color_code: None,
        color_items: None,
    }
}

fn module_command(
    device_id: &str,
    device_family: DeviceFamily,
    kind: CommandKind,
    module_index: u32,
    module_id: &str,
) -> CommandRequest {
    CommandRequest {
        device_id: device_id.to_string(),
        device_family,
        kind,
        module_index: Some(module_index),
        module_id: Some(module_id.to_string()),
        sensor_index: None,
        color_code: None,
        color_items: None,
    }
}

/// Computes the ordered list of commands a single heartbeat should trigger:
/// self-healing first (device-info, then module-info), then per-module
/// warmup in heartbeat order. Returns an empty list if nothing is missing
/// or stale and warmup is disabled — self-healing always runs regardless
/// of `config.enabled`.
pub fn plan(snapshot: &HeartbeatSnapshot, config: &WarmupConfig) -> Vec<CommandRequest> {
    let mut commands = Vec::new();
    let now = Utc::now();

    if snapshot.ip.is_none() || snapshot.mac.is_none() {
        let kind = match snapshot.device_family {
            DeviceFamily::J => CommandKind::QryDevModInfo,
            DeviceFamily::B => CommandKind::QryDeviceInfo,
        };
        commands.push(device_command(&snapshot.device_id, snapshot.device_family, kind));
    }

    if snapshot.device_family == DeviceFamily::B && snapshot.modules.iter().any(|m| m.fw_ver.is_none()) {
        commands.push(device_command(&snapshot.device_id, snapshot.device_family, CommandKind::QryModuleInfo));
    }

    if !config.enabled {
        return commands;
    }

    for module in &snapshot.modules {
        let temp_hum_stale = module.temp_hum_empty
            || module.last_seen_temp_hum.map(|t| now - t > config.temp_hum_staleness).unwrap_or(true);
        if temp_hum_stale {
            commands.push(module_command(
                &snapshot.device_id,
                snapshot.device_family,
                CommandKind::QryTempHum,
                module.module_index,
                &module.module_id,
            ));
        }

        let rfid_stale =
            module.rfid_empty || module.last_seen_rfid.map(|t| now - t > config.rfid_staleness).unwrap_or(true);
        if rfid_stale {
            commands.push(module_command(
                &snapshot.device_id,
                snapshot.device_family,
                CommandKind::QryRfidSnapshot,
                module.module_index,
                &module.module_id,
            ));
        }

        if module.door_state.is_none() && module.door1_state.is_none() {
            commands.push(module_command(
                &snapshot.device_id,
                snapshot.device_family,
                CommandKind::QryDoorState,
                module.module_index,
                &module.module_id,
            ));
        }
    }

    commands
}

/// Emits `commands` onto `tx` with `config.stagger_delay` between sends, in
/// the order `plan` produced them. Intended to run as its own spawned task
/// per heartbeat so a slow stagger run never blocks frame ingestion.
pub async fn dispatch_staggered(commands: Vec<CommandRequest>, config: &WarmupConfig, tx: &mpsc::Sender<CommandRequest>) {
    let mut first = true;
    for command in commands {
        if !first {
            sleep(config.stagger_delay).await;
        }
        first = false;
        if tx.send(command).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warmup::domain::ModuleSnapshot;

    fn snapshot_with_one_fresh_module() -> HeartbeatSnapshot {
        HeartbeatSnapshot {
            device_id: "dev-1".to_string(),
            device_family: DeviceFamily::J,
            ip: Some("10.0.0.1".to_string()),
            mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
            modules: vec![ModuleSnapshot {
                module_index: 1,
                module_id: "M1".to_string(),
                fw_ver: Some("1.0".to_string()),
                temp_hum_empty: false,
                last_seen_temp_hum: Some(Utc::now()),
                rfid_empty: false,
                last_seen_rfid: Some(Utc::now()),
                door_state: Some(0),
                door1_state: None,
            }],
        }
    }

    #[test]
    fn fresh_module_with_known_ip_mac_requests_nothing() {
        let snapshot = snapshot_with_one_fresh_module();
        let commands = plan(&snapshot, &WarmupConfig::default());
        assert!(commands.is_empty());
    }

    #[test]
    fn missing_ip_triggers_self_healing_before_warmup() {
        let mut snapshot = snapshot_with_one_fresh_module();
        snapshot.ip = None;
        snapshot.modules[0].rfid_empty = true;

        let commands = plan(&snapshot, &WarmupConfig::default());

        assert_eq!(commands[0].kind, CommandKind::QryDevModInfo);
        assert_eq!(commands[1].kind, CommandKind::QryRfidSnapshot);
    }

    #[test]
    fn disabled_warmup_still_runs_self_healing() {
        let mut snapshot = snapshot_with_one_fresh_module();
        snapshot.mac = None;
        let config = WarmupConfig { enabled: false, ..WarmupConfig::default() };

        let commands = plan(&snapshot, &config);

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, CommandKind::QryDevModInfo);
    }

    #[test]
    fn empty_door_state_requests_door_query() {
        let mut snapshot = snapshot_with_one_fresh_module();
        snapshot.modules[0].door_state = None;

        let commands = plan(&snapshot, &WarmupConfig::default());

        assert!(commands.iter().any(|c| c.kind == CommandKind::QryDoorState));
    }

    #[test]
    fn family_b_missing_firmware_requests_module_info() {
        let mut snapshot = snapshot_with_one_fresh_module();
        snapshot.device_family = DeviceFamily::B;
        snapshot.modules[0].fw_ver = None;

        let commands = plan(&snapshot, &WarmupConfig::default());

        assert!(commands.iter().any(|c| c.kind == CommandKind::QryModuleInfo));
    }
}
