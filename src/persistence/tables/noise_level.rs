//! Append-only storage for NOISE_LEVEL events, pivoted into
//! `noise_index16..18`.

use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::persistence::domain::NoiseLevelRow;

pub async fn create_table_noise_level(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS noise_level (
            id            SERIAL PRIMARY KEY,
            device_id     TEXT NOT NULL,
            module_index  INTEGER NOT NULL,
            module_id     TEXT NOT NULL,
            message_id    TEXT NOT NULL,
            noise_index16 DOUBLE PRECISION,
            noise_index17 DOUBLE PRECISION,
            noise_index18 DOUBLE PRECISION,
            parse_at      TIMESTAMPTZ NOT NULL,
            update_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .await?;
    Ok(())
}

pub async fn insert_noise_level(pool: &PgPool, rows: Vec<NoiseLevelRow>) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO noise_level (
            device_id, module_index, module_id, message_id,
            noise_index16, noise_index17, noise_index18, parse_at
        ) ",
    );

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.device_id)
            .push_bind(row.module_index)
            .push_bind(row.module_id)
            .push_bind(row.message_id)
            .push_bind(row.noise_index16)
            .push_bind(row.noise_index17)
            .push_bind(row.noise_index18)
            .push_bind(row.parse_at.unwrap_or_else(chrono::Utc::now));
    });

    builder.build().execute(pool).await?;
    Ok(())
}
