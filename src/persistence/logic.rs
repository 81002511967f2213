//! Persistence flush task.
//!
//! Implements a batching sink: normalized events are routed into per-table
//! buffers in memory and flushed to the repository when the combined row
//! count reaches `batchSize` or `flushInterval` elapses, whichever comes
//! first. A table whose flush fails keeps its rows buffered for the next
//! cycle rather than being dropped.

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use crate::bus::domain::EventBus;
use crate::config::Config;
use crate::persistence::domain::{route_event, PersistenceBuffers};
use crate::persistence::repository::Repository;

#[instrument(name = "persistence_task", skip(bus, repo, config))]
pub async fn persistence_task(bus: EventBus, repo: Repository, config: Config) {
    info!("persistence task started");
    let mut rx = bus.subscribe_normalized();
    let mut buffers = PersistenceBuffers::default();
    let mut ticker = interval(config.storage.flush_interval);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        route_event(&event, &mut buffers, Utc::now());
                        if buffers.total_len() >= config.storage.batch_size {
                            flush(&repo, &bus, &mut buffers, &config).await;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        error!(skipped, "persistence task lagged behind normalized event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("normalized event stream closed, flushing remaining rows");
                        flush(&repo, &bus, &mut buffers, &config).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if buffers.total_len() > 0 {
                    flush(&repo, &bus, &mut buffers, &config).await;
                }
            }
        }
    }
}

async fn flush(repo: &Repository, bus: &EventBus, buffers: &mut PersistenceBuffers, config: &Config) {
    debug!(rows = buffers.total_len(), "flushing persistence batch");
    match tokio::time::timeout(config.storage.write_timeout, repo.insert(buffers)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "persistence batch insert failed");
            bus.publish_error(crate::bus::domain::ErrorEvent {
                component: "persistence",
                message: format!("batch insert failed: {e}"),
            });
        }
        Err(_) => {
            error!("persistence batch insert timed out");
            bus.publish_error(crate::bus::domain::ErrorEvent {
                component: "persistence",
                message: "batch insert timed out".to_string(),
            });
        }
    }
}

/// Spawns the persistence task in the background. No-op if storage is
/// disabled in configuration.
pub fn start_persistence(bus: EventBus, repo: Repository, config: Config) {
    if !config.storage.enabled {
        info!("storage disabled, persistence task not started");
        return;
    }
    tokio::spawn(async move {
        persistence_task(bus, repo, config).await;
    });
}
