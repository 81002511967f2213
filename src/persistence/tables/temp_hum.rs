//! Append-only storage for TEMP_HUM events, pivoted: `sensorIndex` 10..15
//! becomes columns `temp_index10..15`/`hum_index10..15` rather than a
//! variable-width child table, so one module's reading is one row.

use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::persistence::domain::TempHumRow;

pub async fn create_table_temp_hum(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS temp_hum (
            id            SERIAL PRIMARY KEY,
            device_id     TEXT NOT NULL,
            module_index  INTEGER NOT NULL,
            module_id     TEXT NOT NULL,
            message_id    TEXT NOT NULL,
            temp_index10  DOUBLE PRECISION,
            hum_index10   DOUBLE PRECISION,
            temp_index11  DOUBLE PRECISION,
            hum_index11   DOUBLE PRECISION,
            temp_index12  DOUBLE PRECISION,
            hum_index12   DOUBLE PRECISION,
            temp_index13  DOUBLE PRECISION,
            hum_index13   DOUBLE PRECISION,
            temp_index14  DOUBLE PRECISION,
            hum_index14   DOUBLE PRECISION,
            temp_index15  DOUBLE PRECISION,
            hum_index15   DOUBLE PRECISION,
            parse_at      TIMESTAMPTZ NOT NULL,
            update_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .await?;
    Ok(())
}

pub async fn insert_temp_hum(pool: &PgPool, rows: Vec<TempHumRow>) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO temp_hum (
            device_id, module_index, module_id, message_id,
            temp_index10, hum_index10, temp_index11, hum_index11,
            temp_index12, hum_index12, temp_index13, hum_index13,
            temp_index14, hum_index14, temp_index15, hum_index15, parse_at
        ) ",
    );

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.device_id)
            .push_bind(row.module_index)
            .push_bind(row.module_id)
            .push_bind(row.message_id)
            .push_bind(row.temp_index10)
            .push_bind(row.hum_index10)
            .push_bind(row.temp_index11)
            .push_bind(row.hum_index11)
            .push_bind(row.temp_index12)
            .push_bind(row.hum_index12)
            .push_bind(row.temp_index13)
            .push_bind(row.hum_index13)
            .push_bind(row.temp_index14)
            .push_bind(row.hum_index14)
            .push_bind(row.temp_index15)
            .push_bind(row.hum_index15)
            .push_bind(row.parse_at.unwrap_or_else(chrono::Utc::now));
    });

    builder.build().execute(pool).await?;
    Ok(())
}
