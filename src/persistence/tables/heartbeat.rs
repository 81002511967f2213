//! Append-only storage for HEARTBEAT events: one row per frame, payload
//! kept as a structured JSON column rather than pivoted (a heartbeat's
//! module list is too variable in width to usefully flatten).

use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::persistence::domain::HeartbeatRow;

pub async fn create_table_heartbeat(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS heartbeat (
            id          SERIAL PRIMARY KEY,
            device_id   TEXT NOT NULL,
            message_id  TEXT NOT NULL,
            payload     JSONB NOT NULL,
            parse_at    TIMESTAMPTZ NOT NULL,
            update_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .await?;
    Ok(())
}

pub async fn insert_heartbeat(pool: &PgPool, rows: Vec<HeartbeatRow>) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO heartbeat (device_id, message_id, payload, parse_at) ");

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.device_id).push_bind(row.message_id).push_bind(row.payload).push_bind(row.parse_at);
    });

    builder.build().execute(pool).await?;
    Ok(())
}
