//! Shadow cache mutation primitives: `merge` and `reconcile`. These are
//! the only two operations that touch
//! `MetadataEntry.active_modules`, and they encode deliberately different
//! policies:
//!
//! * `merge` is used by `*_INFO`/`UTOTAL_CHANGED`: a non-null incoming
//!   scalar overwrites, a null one is ignored, and modules are only ever
//!   added or updated, never removed.
//! * `reconcile` is used by `HEARTBEAT`: the heartbeat is authoritative for
//!   *presence*, so a module missing from the latest heartbeat is dropped
//!   from `active_modules`. Firmware version is untouched by reconcile —
//!   it only ever comes from `*_INFO` merges.
//!
//! Both return the ordered list of human-readable change descriptions used
//! to build `META_CHANGED_EVENT` payloads, and both touch `last_seen_info`.

use chrono::Utc;

use crate::model::domain::ModuleMetaEntry;
use crate::shadow::domain::{ActiveModule, MetadataEntry};

/// Input to `merge`: any subset of device-level scalars plus zero or more
/// module entries. A `None` field means "not present on the wire", which
/// merge treats as "leave the cached value alone".
#[derive(Debug, Clone, Default)]
pub struct MergeInput {
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub fw_ver: Option<String>,
    pub netmask: Option<String>,
    pub gateway_ip: Option<String>,
    pub modules: Vec<ModuleMetaEntry>,
}

fn module_label(module_id: &Option<String>, module_index: u32) -> String {
    match module_id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => module_index.to_string(),
    }
}

/// Merges `input` into `entry`, returning the ordered change descriptions.
pub fn merge(entry: &mut MetadataEntry, input: MergeInput) -> Vec<String> {
    let mut changes = Vec::new();

    if let Some(ip) = input.ip {
        if entry.ip.as_deref() != Some(ip.as_str()) {
            changes.push(format!(
                "Device IP changed from {} to {}",
                entry.ip.clone().unwrap_or_else(|| "unknown".to_string()),
                ip
            ));
            entry.ip = Some(ip);
        }
    }
    if let Some(mac) = input.mac {
        entry.mac = Some(mac);
    }
    if let Some(fw_ver) = input.fw_ver {
        if entry.fw_ver.as_deref() != Some(fw_ver.as_str()) {
            changes.push(format!(
                "Device Firmware changed from {} to {}",
                entry.fw_ver.clone().unwrap_or_else(|| "unknown".to_string()),
                fw_ver
            ));
            entry.fw_ver = Some(fw_ver);
        }
    }
    if let Some(netmask) = input.netmask {
        entry.netmask = Some(netmask);
    }
    if let Some(gateway_ip) = input.gateway_ip {
        entry.gateway_ip = Some(gateway_ip);
    }

    for incoming in input.modules {
        match entry
            .active_modules
            .iter()
            .position(|m| m.module_index == incoming.module_index)
        {
            None => {
                let label = module_label(&incoming.module_id, incoming.module_index);
                changes.push(format!("Module {} added at Index {}", label, incoming.module_index));
                entry.active_modules.push(ActiveModule {
                    module_index: incoming.module_index,
                    module_id: incoming.module_id.unwrap_or_else(|| "0".to_string()),
                    fw_ver: incoming.fw_ver,
                    u_total: incoming.u_total,
                });
            }
            Some(pos) => {
                let existing = &mut entry.active_modules[pos];
                if let Some(new_id) = incoming.module_id {
                    if existing.module_id != new_id {
                        changes.push(format!(
                            "Module {} ID changed from {} to {}",
                            existing.module_index, existing.module_id, new_id
                        ));
                        existing.module_id = new_id;
                    }
                }
                if let Some(new_fw) = incoming.fw_ver {
                    if existing.fw_ver.as_deref() != Some(new_fw.as_str()) {
                        changes.push(format!(
                            "Module {} Firmware changed from {} to {}",
                            existing.module_index,
                            existing.fw_ver.clone().unwrap_or_else(|| "unknown".to_string()),
                            new_fw
                        ));
                        existing.fw_ver = Some(new_fw);
                    }
                }
                if let Some(new_total) = incoming.u_total {
                    if existing.u_total != Some(new_total) {
                        changes.push(format!(
                            "Module {} U-Total changed from {} to {}",
                            existing.module_index,
                            existing
                                .u_total
                                .map(|v| v.to_string())
                                .unwrap_or_else(|| "unknown".to_string()),
                            new_total
                        ));
                        existing.u_total = Some(new_total);
                    }
                }
            }
        }
    }

    entry.active_modules.sort_by_key(|m| m.module_index);
    entry.last_seen_info = Some(Utc::now());
    changes
}

/// Reconciles `entry.active_modules` against the modules named in the
/// latest heartbeat: surviving modules get their `module_id`/`u_total`
/// overwritten, missing modules are removed, and `fw_ver` is left
/// untouched either way.
pub fn reconcile(entry: &mut MetadataEntry, heartbeat_modules: &[(u32, String, u32)]) -> Vec<String> {
    let mut changes = Vec::new();

    let present: std::collections::HashSet<u32> = heartbeat_modules.iter().map(|(idx, _, _)| *idx).collect();

    entry.active_modules.retain(|m| {
        if present.contains(&m.module_index) {
            true
        } else {
            changes.push(format!("Module {} removed from Index {}", m.module_id, m.module_index));
            false
        }
    });

    for (module_index, module_id, u_total) in heartbeat_modules {
        match entry.active_modules.iter().position(|m| m.module_index == *module_index) {
            Some(pos) => {
                let existing = &mut entry.active_modules[pos];
                existing.module_id = module_id.clone();
                existing.u_total = Some(*u_total);
            }
            None => {
                entry.active_modules.push(ActiveModule {
                    module_index: *module_index,
                    module_id: module_id.clone(),
                    fw_ver: None,
                    u_total: Some(*u_total),
                });
                changes.push(format!("Module {} added at Index {}", module_id, module_index));
            }
        }
    }

    entry.active_modules.sort_by_key(|m| m.module_index);
    entry.last_seen_info = Some(Utc::now());
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::domain::DeviceFamily;

    fn fresh_entry() -> MetadataEntry {
        MetadataEntry::new("dev-1".to_string(), DeviceFamily::B)
    }

    #[test]
    fn merge_preserves_null_fields() {
        let mut entry = fresh_entry();
        entry.ip = Some("10.0.0.1".to_string());

        let changes = merge(
            &mut entry,
            MergeInput {
                ip: None,
                ..Default::default()
            },
        );

        assert!(changes.is_empty());
        assert_eq!(entry.ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn merge_overwrite_emits_single_change() {
        let mut entry = fresh_entry();
        entry.fw_ver = Some("1.0.0".to_string());

        let changes = merge(
            &mut entry,
            MergeInput {
                fw_ver: Some("1.0.1".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(changes.len(), 1);
        assert_eq!(entry.fw_ver.as_deref(), Some("1.0.1"));
    }

    #[test]
    fn reconcile_removes_missing_module() {
        let mut entry = fresh_entry();
        entry.active_modules = vec![
            ActiveModule { module_index: 1, module_id: "A".into(), fw_ver: None, u_total: None },
            ActiveModule { module_index: 2, module_id: "B".into(), fw_ver: None, u_total: None },
        ];

        let changes = reconcile(&mut entry, &[(1, "A".to_string(), 6)]);

        assert_eq!(changes, vec!["Module B removed from Index 2".to_string()]);
        assert_eq!(entry.active_modules.len(), 1);
        assert_eq!(entry.active_modules[0].module_index, 1);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut entry = fresh_entry();
        let heartbeat = vec![(1, "A".to_string(), 6)];
        reconcile(&mut entry, &heartbeat);
        let changes = reconcile(&mut entry, &heartbeat);
        assert!(changes.is_empty());
    }

    #[test]
    fn reconcile_never_clears_firmware() {
        let mut entry = fresh_entry();
        entry.active_modules = vec![ActiveModule {
            module_index: 1,
            module_id: "A".into(),
            fw_ver: Some("2.3.0".into()),
            u_total: Some(6),
        }];

        reconcile(&mut entry, &[(1, "A".to_string(), 6)]);

        assert_eq!(entry.active_modules[0].fw_ver.as_deref(), Some("2.3.0"));
    }

    #[test]
    fn active_modules_stay_order_stable_by_index() {
        let mut entry = fresh_entry();
        merge(
            &mut entry,
            MergeInput {
                modules: vec![
                    ModuleMetaEntry { module_index: 3, module_id: Some("C".into()), fw_ver: None, u_total: None },
                    ModuleMetaEntry { module_index: 1, module_id: Some("A".into()), fw_ver: None, u_total: None },
                ],
                ..Default::default()
            },
        );
        reconcile(&mut entry, &[(1, "A".to_string(), 6), (3, "C".to_string(), 6), (2, "B".to_string(), 6)]);

        let indices: Vec<u32> = entry.active_modules.iter().map(|m| m.module_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }
}
