//! Append-only storage for CMD_RESULT events: one row per command
//! acknowledgement, `original_req` kept hex-encoded as produced by the
//! normalizer rather than decoded back into structured form.

use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::persistence::domain::CmdResultRow;

pub async fn create_table_cmd_result(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS cmd_result (
            id            SERIAL PRIMARY KEY,
            device_id     TEXT NOT NULL,
            module_index  INTEGER NOT NULL,
            message_id    TEXT NOT NULL,
            result        TEXT NOT NULL,
            original_req  TEXT NOT NULL,
            color_map     JSONB,
            parse_at      TIMESTAMPTZ NOT NULL,
            update_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .await?;
    Ok(())
}

pub async fn insert_cmd_result(pool: &PgPool, rows: Vec<CmdResultRow>) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO cmd_result (device_id, module_index, message_id, result, original_req, color_map, parse_at) ",
    );

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.device_id)
            .push_bind(row.module_index)
            .push_bind(row.message_id)
            .push_bind(row.result)
            .push_bind(row.original_req)
            .push_bind(row.color_map)
            .push_bind(row.parse_at);
    });

    builder.build().execute(pool).await?;
    Ok(())
}
