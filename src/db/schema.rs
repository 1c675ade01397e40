//! Schema bootstrap.
//!
//! Only the foreign key used by every aggregate is indexed. Indexes on
//! `birthday` and `sex` were measured with EXPLAIN ANALYZE and never chosen by
//! the planner for the fixed queries, so they are not created.

use crate::error::StoreError;
use sqlx::PgPool;

const CREATE_ROOMS: &str = r#"CREATE TABLE IF NOT EXISTS rooms (
    id INTEGER PRIMARY KEY,
    name VARCHAR(255) NOT NULL CHECK (name <> '')
)"#;

const CREATE_STUDENTS: &str = r#"CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY,
    name VARCHAR(255) NOT NULL CHECK (name <> ''),
    sex VARCHAR(1) NOT NULL,
    birthday TIMESTAMP NOT NULL,
    room_id INTEGER NOT NULL REFERENCES rooms (id)
)"#;

const CREATE_ROOM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_students_room_id ON students (room_id)";

/// Whether both entity tables are present in the current schema.
pub async fn tables_exist(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM information_schema.tables
           WHERE table_schema = current_schema()
             AND table_name IN ('rooms', 'students')"#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count == 2)
}

/// Create tables and the room index in one transaction if they are missing.
pub async fn bootstrap(pool: &PgPool) -> Result<bool, StoreError> {
    if tables_exist(pool).await? {
        log::debug!("schema already present, skipping bootstrap");
        return Ok(false);
    }

    log::info!("creating rooms/students schema");

    let mut tx = pool.begin().await?;
    for statement in [CREATE_ROOMS, CREATE_STUDENTS, CREATE_ROOM_INDEX] {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    Ok(true)
}
