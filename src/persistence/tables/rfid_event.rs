//! Append-only storage for RFID_EVENT records: one row per attach/detach/
//! alarm-toggle, `action` literal is one of `ATTACHED`/`DETACHED`/
//! `ALARM_ON`/`ALARM_OFF` (ten characters fits a fixed-width column).

use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::persistence::domain::RfidEventRow;

pub async fn create_table_rfid_event(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS rfid_event (
            id            SERIAL PRIMARY KEY,
            device_id     TEXT NOT NULL,
            module_index  INTEGER NOT NULL,
            module_id     TEXT NOT NULL,
            message_id    TEXT NOT NULL,
            sensor_index  INTEGER NOT NULL,
            tag_id        TEXT NOT NULL,
            action        VARCHAR(10) NOT NULL,
            is_alarm      BOOLEAN NOT NULL,
            parse_at      TIMESTAMPTZ NOT NULL,
            update_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .await?;
    Ok(())
}

pub async fn insert_rfid_event(pool: &PgPool, rows: Vec<RfidEventRow>) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO rfid_event (device_id, module_index, module_id, message_id, sensor_index, tag_id, action, is_alarm, parse_at) ",
    );

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.device_id)
            .push_bind(row.module_index)
            .push_bind(row.module_id)
            .push_bind(row.message_id)
            .push_bind(row.sensor_index)
            .push_bind(row.tag_id)
            .push_bind(row.action)
            .push_bind(row.is_alarm)
            .push_bind(row.parse_at);
    });

    builder.build().execute(pool).await?;
    Ok(())
}
