//! Batched insert operations.
//!
//! Each batch is written with one multi-row statement built on PostgreSQL's
//! UNNEST and runs inside its own transaction: either the whole batch commits
//! or none of it does. Existing ids are left untouched (`ON CONFLICT DO NOTHING`).

use super::Store;
use crate::error::StoreError;
use crate::models::{Room, Student};
use chrono::NaiveDateTime;
use sqlx::{PgConnection, PgPool};
use std::collections::HashSet;

/// Result of writing one student batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StudentBatchOutcome {
    /// Rows actually inserted (duplicates are skipped silently)
    pub inserted: usize,
    /// Students dropped because their room does not exist
    pub rejected: usize,
}

/// Insert a batch of rooms. Returns the number of rows inserted.
pub async fn insert_rooms_batch(
    conn: &mut PgConnection,
    rooms: &[Room],
) -> Result<usize, sqlx::Error> {
    if rooms.is_empty() {
        return Ok(0);
    }

    let (ids, names): (Vec<i32>, Vec<String>) = rooms
        .iter()
        .map(|room| (room.id, room.name.clone()))
        .unzip();

    let result = sqlx::query(
        r#"INSERT INTO rooms (id, name)
           SELECT id, name FROM UNNEST($1::int[], $2::text[]) AS t (id, name)
           ON CONFLICT (id) DO NOTHING"#,
    )
    .bind(&ids)
    .bind(&names)
    .execute(&mut *conn)
    .await?;

    let inserted = result.rows_affected() as usize;
    if inserted < rooms.len() {
        log::debug!(
            "insert_rooms_batch: {} of {} rooms already existed",
            rooms.len() - inserted,
            rooms.len()
        );
    }
    Ok(inserted)
}

/// Resolve which of `room_ids` exist, with a single query.
pub async fn existing_room_ids(
    conn: &mut PgConnection,
    room_ids: &[i32],
) -> Result<HashSet<i32>, sqlx::Error> {
    if room_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<i32> = sqlx::query_scalar("SELECT id FROM rooms WHERE id = ANY($1)")
        .bind(room_ids)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().collect())
}

/// Insert a batch of students whose rooms exist; others are dropped.
pub async fn insert_students_batch(
    conn: &mut PgConnection,
    students: &[Student],
) -> Result<StudentBatchOutcome, sqlx::Error> {
    if students.is_empty() {
        return Ok(StudentBatchOutcome::default());
    }

    let referenced: Vec<i32> = students
        .iter()
        .map(|s| s.room_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let known = existing_room_ids(conn, &referenced).await?;

    let accepted: Vec<&Student> = students
        .iter()
        .filter(|s| known.contains(&s.room_id))
        .collect();
    let rejected = students.len() - accepted.len();

    if rejected > 0 {
        for student in students.iter().filter(|s| !known.contains(&s.room_id)) {
            log::debug!(
                "dropping student {}: room {} not found",
                student.id,
                student.room_id
            );
        }
    }

    if accepted.is_empty() {
        return Ok(StudentBatchOutcome {
            inserted: 0,
            rejected,
        });
    }

    let mut ids = Vec::with_capacity(accepted.len());
    let mut names = Vec::with_capacity(accepted.len());
    let mut sexes = Vec::with_capacity(accepted.len());
    let mut birthdays: Vec<NaiveDateTime> = Vec::with_capacity(accepted.len());
    let mut room_ids = Vec::with_capacity(accepted.len());

    for student in accepted {
        ids.push(student.id);
        names.push(student.name.clone());
        sexes.push(student.sex.clone());
        birthdays.push(student.birthday);
        room_ids.push(student.room_id);
    }

    let result = sqlx::query(
        r#"INSERT INTO students (id, name, sex, birthday, room_id)
           SELECT id, name, sex, birthday, room_id
           FROM UNNEST($1::int[], $2::text[], $3::text[], $4::timestamp[], $5::int[])
               AS t (id, name, sex, birthday, room_id)
           ON CONFLICT (id) DO NOTHING"#,
    )
    .bind(&ids)
    .bind(&names)
    .bind(&sexes)
    .bind(&birthdays)
    .bind(&room_ids)
    .execute(&mut *conn)
    .await?;

    Ok(StudentBatchOutcome {
        inserted: result.rows_affected() as usize,
        rejected,
    })
}

async fn write_rooms(pool: &PgPool, rooms: &[Room]) -> Result<usize, StoreError> {
    let mut tx = pool.begin().await?;
    match insert_rooms_batch(&mut tx, rooms).await {
        Ok(inserted) => {
            tx.commit().await?;
            Ok(inserted)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                log::warn!("room batch rollback failed: {}", rollback_err);
            }
            Err(err.into())
        }
    }
}

async fn write_students(
    pool: &PgPool,
    students: &[Student],
) -> Result<StudentBatchOutcome, StoreError> {
    let mut tx = pool.begin().await?;
    match insert_students_batch(&mut tx, students).await {
        Ok(outcome) => {
            tx.commit().await?;
            Ok(outcome)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                log::warn!("student batch rollback failed: {}", rollback_err);
            }
            Err(err.into())
        }
    }
}

impl Store {
    /// Insert a room batch atomically. `None` means the batch was rolled back.
    pub async fn insert_rooms(&self, rooms: &[Room]) -> Option<usize> {
        if rooms.is_empty() {
            return Some(0);
        }
        let result = match self.pool() {
            Ok(pool) => write_rooms(pool, rooms).await,
            Err(err) => Err(err),
        };
        let inserted = Self::settle("room batch insert", result)?;
        log::trace!("room batch: {} of {} inserted", inserted, rooms.len());
        Some(inserted)
    }

    /// Insert a student batch atomically, dropping students with unknown rooms.
    pub async fn insert_students(&self, students: &[Student]) -> Option<StudentBatchOutcome> {
        if students.is_empty() {
            return Some(StudentBatchOutcome::default());
        }
        let result = match self.pool() {
            Ok(pool) => write_students(pool, students).await,
            Err(err) => Err(err),
        };
        let outcome = Self::settle("student batch insert", result)?;
        if outcome.rejected > 0 {
            log::warn!(
                "student batch: {} rejected for missing rooms",
                outcome.rejected
            );
        }
        Some(outcome)
    }
}
