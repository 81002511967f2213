//! Normalizer output shapes. The normalizer itself is a pure
//! `IntermediateForm -> (shadow mutation, NormalizerOutput)` transform, one
//! function per `Kind`

use crate::model::domain::{CommandRequest, NormalizedEvent};

/// Everything one `normalize()` call produces: the normalized events ready
/// for persistence/push, and any commands the self-healing/warmup pass
/// decided to request off the back of this frame.
#[derive(Debug, Clone, Default)]
pub struct NormalizerOutput {
    pub events: Vec<NormalizedEvent>,
    pub commands: Vec<CommandRequest>,
}

impl NormalizerOutput {
    pub fn with_event(event: NormalizedEvent) -> Self {
        Self { events: vec![event], commands: Vec::new() }
    }

    pub fn push_event(&mut self, event: NormalizedEvent) {
        self.events.push(event);
    }

    pub fn push_commands(&mut self, commands: Vec<CommandRequest>) {
        self.commands.extend(commands);
    }
}

/// Valid heartbeat slot index range ("drop ... out-of-range
/// index"). FamilyB's fixed 10-slot frame only ever produces 1..=10, but
/// FamilyJ heartbeats carry module indices up to 24 and arrive unfiltered,
/// so the normalizer validates against the wider range both families share.
pub const HEARTBEAT_INDEX_RANGE: std::ops::RangeInclusive<u32> = 1..=24;

/// Valid door-reporting module index range DOOR_STATE
/// validation clause.
pub const DOOR_INDEX_RANGE: std::ops::RangeInclusive<u32> = 1..=5;
