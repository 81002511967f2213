//! Append-only storage for DOOR_STATE events, one row per payload (the
//! normalizer's door event always carries a single record).

use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::persistence::domain::DoorEventRow;

pub async fn create_table_door_event(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS door_event (
            id            SERIAL PRIMARY KEY,
            device_id     TEXT NOT NULL,
            module_index  INTEGER NOT NULL,
            module_id     TEXT NOT NULL,
            message_id    TEXT NOT NULL,
            door_state    INTEGER,
            door1_state   INTEGER,
            door2_state   INTEGER,
            parse_at      TIMESTAMPTZ NOT NULL,
            update_at     TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .await?;
    Ok(())
}

pub async fn insert_door_event(pool: &PgPool, rows: Vec<DoorEventRow>) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO door_event (device_id, module_index, module_id, message_id, door_state, door1_state, door2_state, parse_at) ",
    );

    builder.push_values(rows, |mut b, row| {
        b.push_bind(row.device_id)
            .push_bind(row.module_index)
            .push_bind(row.module_id)
            .push_bind(row.message_id)
            .push_bind(row.door_state)
            .push_bind(row.door1_state)
            .push_bind(row.door2_state)
            .push_bind(row.parse_at);
    });

    builder.build().execute(pool).await?;
    Ok(())
}
