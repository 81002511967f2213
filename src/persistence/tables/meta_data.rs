//! Upserted storage for DEVICE_METADATA: one row per device, keyed on
//! `device_id`, unlike every other table which is append-only.

use sqlx::{Executor, PgPool};

use crate::persistence::domain::MetaDataRow;

pub async fn create_table_meta_data(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS meta_data (
            device_id      TEXT PRIMARY KEY,
            device_family  TEXT NOT NULL,
            ip             TEXT,
            mac            TEXT,
            fw_ver         TEXT,
            netmask        TEXT,
            gateway_ip     TEXT,
            active_modules JSONB NOT NULL,
            parse_at       TIMESTAMPTZ NOT NULL,
            update_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .await?;
    Ok(())
}

/// Upserts each row individually rather than via `push_values`: Postgres
/// has no multi-row `ON CONFLICT` shorthand that keeps per-row
/// `EXCLUDED` semantics simple, and a metadata batch is tiny compared to
/// telemetry (one row per device per heartbeat at most).
pub async fn upsert_meta_data(pool: &PgPool, rows: Vec<MetaDataRow>) -> Result<(), sqlx::Error> {
    for row in rows {
        sqlx::query(
            r#"
            INSERT INTO meta_data (device_id, device_family, ip, mac, fw_ver, netmask, gateway_ip, active_modules, parse_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (device_id) DO UPDATE SET
                device_family = EXCLUDED.device_family,
                ip = EXCLUDED.ip,
                mac = EXCLUDED.mac,
                fw_ver = EXCLUDED.fw_ver,
                netmask = EXCLUDED.netmask,
                gateway_ip = EXCLUDED.gateway_ip,
                active_modules = EXCLUDED.active_modules,
                parse_at = EXCLUDED.parse_at,
                update_at = now()
            "#,
        )
        .bind(row.device_id)
        .bind(row.device_family)
        .bind(row.ip)
        .bind(row.mac)
        .bind(row.fw_ver)
        .bind(row.netmask)
        .bind(row.gateway_ip)
        .bind(row.active_modules)
        .bind(row.parse_at)
        .execute(pool)
        .await?;
    }
    Ok(())
}
