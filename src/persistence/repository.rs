//! Persistence facade over PostgreSQL.
//!
//! Centralizes pool creation, schema setup, and the dispatch of a filled
//! [`PersistenceBuffers`] batch to the per-table insert/upsert functions.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::persistence::domain::PersistenceBuffers;
use crate::persistence::tables::cmd_result::{create_table_cmd_result, insert_cmd_result};
use crate::persistence::tables::door_event::{create_table_door_event, insert_door_event};
use crate::persistence::tables::heartbeat::{create_table_heartbeat, insert_heartbeat};
use crate::persistence::tables::meta_data::{create_table_meta_data, upsert_meta_data};
use crate::persistence::tables::noise_level::{create_table_noise_level, insert_noise_level};
use crate::persistence::tables::rfid_event::{create_table_rfid_event, insert_rfid_event};
use crate::persistence::tables::rfid_snapshot::{create_table_rfid_snapshot, insert_rfid_snapshot};
use crate::persistence::tables::temp_hum::{create_table_temp_hum, insert_temp_hum};
use crate::persistence::tables::topchange_event::{create_table_topchange_event, insert_topchange_event};

/// Cheap to clone: wraps an internal `PgPool`. Shared across the persistence
/// flush task and, if a history endpoint ever needs it, the API layer.
#[derive(Clone, Debug)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    /// Attempts to connect and prepare the schema exactly once.
    pub async fn new(config: &Config) -> Result<Self, sqlx::Error> {
        let pool = create_pool(config).await?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Resilient constructor with an infinite retry loop. Recommended entry
    /// point at process startup: if the database isn't reachable yet (e.g.
    /// a container still coming up) this blocks the current task and
    /// retries every `write_timeout` until it succeeds.
    pub async fn create_repository(config: &Config) -> Self {
        info!("creating persistence repository");
        loop {
            match Self::new(config).await {
                Ok(repo) => return repo,
                Err(e) => {
                    error!(error = %e, "failed to create repository, retrying");
                    sleep(config.storage.write_timeout).await;
                }
            }
        }
    }

    /// Persists a heterogeneous batch. Inserts run sequentially per table;
    /// if one table's insert fails midway, previously inserted tables
    /// remain committed and the caller is responsible for retaining the
    /// buffers it is holding for the failed table(s).
    pub async fn insert(&self, buffers: &mut PersistenceBuffers) -> Result<(), sqlx::Error> {
        debug!(rows = buffers.total_len(), "flushing persistence batch");

        if !buffers.heartbeat.is_empty() {
            insert_heartbeat(&self.pool, buffers.heartbeat.clone()).await?;
            buffers.heartbeat.clear();
        }
        if !buffers.rfid_snapshot.is_empty() {
            insert_rfid_snapshot(&self.pool, buffers.rfid_snapshot.clone()).await?;
            buffers.rfid_snapshot.clear();
        }
        if !buffers.rfid_event.is_empty() {
            insert_rfid_event(&self.pool, buffers.rfid_event.clone()).await?;
            buffers.rfid_event.clear();
        }
        if !buffers.temp_hum.is_empty() {
            insert_temp_hum(&self.pool, buffers.temp_hum.clone()).await?;
            buffers.temp_hum.clear();
        }
        if !buffers.noise_level.is_empty() {
            insert_noise_level(&self.pool, buffers.noise_level.clone()).await?;
            buffers.noise_level.clear();
        }
        if !buffers.door_event.is_empty() {
            insert_door_event(&self.pool, buffers.door_event.clone()).await?;
            buffers.door_event.clear();
        }
        if !buffers.meta_data.is_empty() {
            upsert_meta_data(&self.pool, buffers.meta_data.clone()).await?;
            buffers.meta_data.clear();
        }
        if !buffers.topchange_event.is_empty() {
            insert_topchange_event(&self.pool, buffers.topchange_event.clone()).await?;
            buffers.topchange_event.clear();
        }
        if !buffers.cmd_result.is_empty() {
            insert_cmd_result(&self.pool, buffers.cmd_result.clone()).await?;
            buffers.cmd_result.clear();
        }
        Ok(())
    }

    /// Representative cold-read path backing the history API: most recent
    /// heartbeat rows for one device, newest first.
    pub async fn recent_heartbeats(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<crate::persistence::domain::HeartbeatRow>, sqlx::Error> {
        sqlx::query_as::<_, crate::persistence::domain::HeartbeatRow>(
            "SELECT device_id, message_id, payload, parse_at FROM heartbeat \
             WHERE device_id = $1 ORDER BY parse_at DESC LIMIT $2",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn recent_rfid_events(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<crate::persistence::domain::RfidEventRow>, sqlx::Error> {
        sqlx::query_as::<_, crate::persistence::domain::RfidEventRow>(
            "SELECT device_id, module_index, module_id, message_id, sensor_index, tag_id, action, \
             is_alarm, parse_at FROM rfid_event WHERE device_id = $1 ORDER BY parse_at DESC LIMIT $2",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn recent_temp_hum(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<crate::persistence::domain::TempHumRow>, sqlx::Error> {
        sqlx::query_as::<_, crate::persistence::domain::TempHumRow>(
            "SELECT device_id, module_index, module_id, message_id, \
             temp_index10, hum_index10, temp_index11, hum_index11, \
             temp_index12, hum_index12, temp_index13, hum_index13, \
             temp_index14, hum_index14, temp_index15, hum_index15, parse_at \
             FROM temp_hum WHERE device_id = $1 ORDER BY parse_at DESC LIMIT $2",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn recent_door_events(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<crate::persistence::domain::DoorEventRow>, sqlx::Error> {
        sqlx::query_as::<_, crate::persistence::domain::DoorEventRow>(
            "SELECT device_id, module_index, module_id, message_id, door_state, door1_state, \
             door2_state, parse_at FROM door_event WHERE device_id = $1 ORDER BY parse_at DESC LIMIT $2",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    info!("creating database pool");
    PgPoolOptions::new().max_connections(config.db_pool_size).connect(&config.database_url).await
}

async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    info!("ensuring schema exists");
    create_table_heartbeat(pool).await?;
    create_table_rfid_snapshot(pool).await?;
    create_table_rfid_event(pool).await?;
    create_table_temp_hum(pool).await?;
    create_table_noise_level(pool).await?;
    create_table_door_event(pool).await?;
    create_table_meta_data(pool).await?;
    create_table_topchange_event(pool).await?;
    create_table_cmd_result(pool).await?;
    Ok(())
}
