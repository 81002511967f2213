//! Decode and normalize tasks wiring the bus together.

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::bus::domain::{ErrorEvent, EventBus};
use crate::config::Config;
use crate::decoder::family_b;
use crate::decoder::family_j;
use crate::model::domain::{DeviceFamily, IntermediateForm};
use crate::pipeline::domain::{shard_index, NORMALIZER_WORKER_COUNT, WORKER_INBOX_CAPACITY};
use crate::shadow::domain::Shadow;
use crate::warmup::domain::WarmupConfig;
use crate::warmup::logic::dispatch_staggered;

/// Subscribes to raw frames, decodes each per its family, and republishes
/// the intermediate form (or an error, never both).
pub async fn decode_task(bus: EventBus, config: Config) {
    let mut rx = bus.subscribe_raw_frame();

    loop {
        let frame = match rx.recv().await {
            Ok(frame) => frame,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "decode task lagged behind raw frame stream");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        };

        if config.debug.log_raw_frame {
            debug!(topic = %frame.topic, family = %frame.device_family, len = frame.payload.len(), "raw frame");
        }

        let decoded = match frame.device_family {
            DeviceFamily::B => family_b::decode(&frame.topic, &frame.payload),
            DeviceFamily::J => match std::str::from_utf8(&frame.payload) {
                Ok(text) => family_j::decode(&frame.topic, text),
                Err(_) => Err(crate::decoder::domain::DecodeError::InvalidJson),
            },
        };

        match decoded {
            Ok(Some(ifo)) => {
                if config.debug.log_decoded {
                    debug!(device_id = %ifo.device_id, kind = ?ifo.kind, "decoded frame");
                }
                bus.publish_decoded(ifo);
            }
            Ok(None) => {}
            Err(e) => {
                error!(topic = %frame.topic, error = %e, "decode failed");
                let component = match frame.device_family {
                    DeviceFamily::B => crate::decoder::domain::COMPONENT_FAMILY_B,
                    DeviceFamily::J => crate::decoder::domain::COMPONENT_FAMILY_J,
                };
                bus.publish_error(ErrorEvent::from_decode_error(component, &e));
            }
        }
    }
}

/// One normalizer shard: owns its own inbox so frames for its devices are
/// applied in receive order, independent of every other shard.
async fn normalizer_worker(bus: EventBus, shadow: Shadow, warmup_config: WarmupConfig, mut rx: mpsc::Receiver<IntermediateForm>) {
    let command_tx = bus.command_sender();

    while let Some(ifo) = rx.recv().await {
        let output = crate::normalizer::logic::normalize(ifo, &shadow, &warmup_config);

        for event in output.events {
            bus.publish_normalized(event);
        }

        if !output.commands.is_empty() {
            let warmup_config = warmup_config.clone();
            let command_tx = command_tx.clone();
            tokio::spawn(async move {
                dispatch_staggered(output.commands, &warmup_config, &command_tx).await;
            });
        }
    }
}

/// Dispatches decoded frames to their device's shard, dropping (with an
/// error event) when that shard's inbox is full rather than blocking
/// upstream broker ingestion.
async fn shard_dispatcher(bus: EventBus, shard_senders: Vec<mpsc::Sender<IntermediateForm>>) {
    let mut rx = bus.subscribe_decoded();

    loop {
        let ifo = match rx.recv().await {
            Ok(ifo) => ifo,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "shard dispatcher lagged behind decoded frame stream");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        };

        let idx = shard_index(&ifo.device_id, shard_senders.len());
        let device_id = ifo.device_id.clone();
        if shard_senders[idx].try_send(ifo).is_err() {
            warn!(device_id = %device_id, "normalizer shard inbox full, dropping frame");
            bus.publish_error(ErrorEvent {
                component: "normalizer",
                message: format!("shard inbox full for device {device_id}, frame dropped"),
            });
        }
    }
}

pub fn start_pipeline(bus: EventBus, shadow: Shadow, config: Config) {
    let warmup_config = WarmupConfig::from(&config);

    tokio::spawn(decode_task(bus.clone(), config.clone()));

    let mut shard_senders = Vec::with_capacity(NORMALIZER_WORKER_COUNT);
    for _ in 0..NORMALIZER_WORKER_COUNT {
        let (tx, rx) = mpsc::channel(WORKER_INBOX_CAPACITY);
        shard_senders.push(tx);
        tokio::spawn(normalizer_worker(bus.clone(), shadow.clone(), warmup_config.clone(), rx));
    }

    tokio::spawn(shard_dispatcher(bus, shard_senders));
}
