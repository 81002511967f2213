//! Periodic offline-aging sweep over shadow telemetry.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::bus::domain::EventBus;
use crate::model::domain::{Kind, NormalizedEvent, PayloadRecord};
use crate::shadow::domain::Shadow;
use crate::watchdog::domain::{AgedOutModule, WatchdogConfig};

/// Single scan pass: flips `isOnline=false` on any telemetry entry whose
/// `lastSeenHeartbeat` is older than `heartbeat_timeout`, returning the
/// entries it aged out. Entries with no heartbeat seen yet are left alone
/// (nothing to age from).
pub fn scan(shadow: &Shadow, heartbeat_timeout: chrono::Duration, now: DateTime<Utc>) -> Vec<AgedOutModule> {
    let mut aged = Vec::new();

    for mut entry in shadow.telemetry_map().iter_mut() {
        let Some(last_seen) = entry.last_seen_heartbeat else { continue };
        if entry.is_online && now - last_seen > heartbeat_timeout {
            entry.is_online = false;
            aged.push(AgedOutModule {
                device_id: entry.device_id.clone(),
                device_family: entry.device_family,
                module_index: entry.module_index,
                module_id: entry.module_id.clone(),
            });
        }
    }

    aged
}

#[instrument(name = "watchdog_task", skip(shadow, bus, config))]
pub async fn watchdog_task(shadow: Shadow, bus: EventBus, config: WatchdogConfig) {
    info!("watchdog task started");
    let mut ticker = tokio::time::interval(config.check_interval);
    let heartbeat_timeout = chrono::Duration::from_std(config.heartbeat_timeout)
        .unwrap_or_else(|_| chrono::Duration::seconds(120));

    loop {
        ticker.tick().await;
        let aged = scan(&shadow, heartbeat_timeout, Utc::now());
        if aged.is_empty() {
            continue;
        }
        debug!(count = aged.len(), "watchdog aged out modules");

        if config.emit_status_change_event {
            for module in aged {
                bus.publish_normalized(NormalizedEvent::module_scoped(
                    module.device_id,
                    module.device_family,
                    Kind::DeviceStatusChanged,
                    "watchdog",
                    module.module_index,
                    module.module_id,
                    vec![PayloadRecord::DeviceStatusChanged { is_online: false }],
                ));
            }
        }
    }
}

pub fn start_watchdog(shadow: Shadow, bus: EventBus, config: WatchdogConfig) {
    tokio::spawn(async move {
        watchdog_task(shadow, bus, config).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::domain::DeviceFamily;

    fn make_shadow_with_entry(is_online: bool, last_seen: DateTime<Utc>) -> Shadow {
        let shadow = Shadow::new();
        {
            let mut entry = shadow.telemetry_entry("dev1", DeviceFamily::B, 1, "1");
            entry.is_online = is_online;
            entry.last_seen_heartbeat = Some(last_seen);
        }
        shadow
    }

    #[test]
    fn scan_ages_out_stale_module() {
        let now = Utc::now();
        let shadow = make_shadow_with_entry(true, now - chrono::Duration::seconds(200));
        let aged = scan(&shadow, chrono::Duration::seconds(120), now);
        assert_eq!(aged.len(), 1);
        assert!(!shadow.telemetry_get("dev1", 1).unwrap().is_online);
    }

    #[test]
    fn scan_leaves_fresh_module_online() {
        let now = Utc::now();
        let shadow = make_shadow_with_entry(true, now - chrono::Duration::seconds(10));
        let aged = scan(&shadow, chrono::Duration::seconds(120), now);
        assert!(aged.is_empty());
        assert!(shadow.telemetry_get("dev1", 1).unwrap().is_online);
    }

    #[test]
    fn scan_is_idempotent_once_offline() {
        let now = Utc::now();
        let shadow = make_shadow_with_entry(false, now - chrono::Duration::seconds(500));
        let aged = scan(&shadow, chrono::Duration::seconds(120), now);
        assert!(aged.is_empty(), "already-offline module should not be re-reported every scan");
    }

    #[test]
    fn scan_ignores_entry_with_no_heartbeat_seen() {
        let now = Utc::now();
        let shadow = Shadow::new();
        shadow.telemetry_entry("dev1", DeviceFamily::B, 1, "1");
        let aged = scan(&shadow, chrono::Duration::seconds(120), now);
        assert!(aged.is_empty());
    }
}
