//! Append-only storage for full RFID_SNAPSHOT events: the durable history
//! counterpart to the shadow's latest-only `rfid` field.

use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::persistence::domain::RfidSnapshotRow;

pub async fn create_table_rfid_snapshot(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS rfid_snapshot (
            id            SERIAL PRIMARY KEY,
            device_id     TEXT NOT NULL,
            module_index  INTEGER NOT NULL,
            module_id     TEXT NOT NULL,
            message_id    TEXT NOT NULL,
            snapshot      JSONB NOT NULL,
            parse_at      TIMESTAMPTZ NOT NULL,
            update_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .await?;
    Ok(())
}

pub async fn insert_rfid_snapshot(pool: &PgPool, rows: Vec<RfidSnapshotRow>) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO rfid_snapshot (device_id, module_index, module_id, message_id, snapshot, parse_at) ",
    );

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.device_id)
            .push_bind(row.module_index)
            .push_bind(row.module_id)
            .push_bind(row.message_id)
            .push_bind(row.snapshot)
            .push_bind(row.parse_at);
    });

    builder.build().execute(pool).await?;
    Ok(())
}
