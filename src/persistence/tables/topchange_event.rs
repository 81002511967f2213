//! Append-only storage for META_CHANGED_EVENT: one row per human-readable
//! change description (a single heartbeat's reconcile can produce several).

use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::persistence::domain::TopChangeEventRow;

pub async fn create_table_topchange_event(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS topchange_event (
            id          SERIAL PRIMARY KEY,
            device_id   TEXT NOT NULL,
            message_id  TEXT NOT NULL,
            description TEXT NOT NULL,
            parse_at    TIMESTAMPTZ NOT NULL,
            update_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .await?;
    Ok(())
}

pub async fn insert_topchange_event(pool: &PgPool, rows: Vec<TopChangeEventRow>) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO topchange_event (device_id, message_id, description, parse_at) ");

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.device_id).push_bind(row.message_id).push_bind(row.description).push_bind(row.parse_at);
    });

    builder.build().execute(pool).await?;
    Ok(())
}
