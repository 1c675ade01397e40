//! The four fixed aggregate queries.
//!
//! Rankings break ties on `room_id` ascending so results are reproducible.

use super::Store;
use crate::error::StoreError;
use crate::models::{Record, RoomStudentCount, RoomSummary, to_record};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool};

/// Row limit used by the ranking queries when none is given.
pub const DEFAULT_RANKING_LIMIT: i64 = 5;

const ROOMS_WITH_STUDENT_COUNT: &str = r#"SELECT r.id AS room_id, r.name AS room_name, COUNT(s.id) AS student_count
FROM rooms r
LEFT JOIN students s ON s.room_id = r.id
GROUP BY r.id, r.name
ORDER BY r.id"#;

const LOWEST_AVERAGE_AGE_ROOMS: &str = r#"SELECT r.id AS room_id, r.name AS room_name
FROM rooms r
JOIN students s ON s.room_id = r.id
GROUP BY r.id, r.name
ORDER BY AVG(LOCALTIMESTAMP - s.birthday) ASC, r.id ASC
LIMIT $1"#;

const LARGEST_AGE_DIFFERENCE_ROOMS: &str = r#"SELECT r.id AS room_id, r.name AS room_name
FROM rooms r
JOIN students s ON s.room_id = r.id
GROUP BY r.id, r.name
ORDER BY MAX(s.birthday) - MIN(s.birthday) DESC, r.id ASC
LIMIT $1"#;

const MIXED_GENDER_ROOMS: &str = r#"SELECT r.id AS room_id, r.name AS room_name
FROM rooms r
JOIN students s ON s.room_id = r.id
GROUP BY r.id, r.name
HAVING COUNT(DISTINCT s.sex) > 1
ORDER BY r.id"#;

/// Identity of each aggregate; `name()` doubles as the export file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    RoomsWithStudentCount,
    LowestAverageAgeRooms,
    LargestAgeDifferenceRooms,
    MixedGenderRooms,
}

impl Aggregate {
    pub const ALL: [Aggregate; 4] = [
        Aggregate::RoomsWithStudentCount,
        Aggregate::LowestAverageAgeRooms,
        Aggregate::LargestAgeDifferenceRooms,
        Aggregate::MixedGenderRooms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::RoomsWithStudentCount => "rooms_with_student_count",
            Aggregate::LowestAverageAgeRooms => "lowest_average_age_rooms",
            Aggregate::LargestAgeDifferenceRooms => "rooms_with_largest_age_difference",
            Aggregate::MixedGenderRooms => "rooms_with_mixed_gender_students",
        }
    }

    /// Whether the query takes a row limit.
    pub fn is_ranking(&self) -> bool {
        matches!(
            self,
            Aggregate::LowestAverageAgeRooms | Aggregate::LargestAgeDifferenceRooms
        )
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Log the plan of `sql` as produced by EXPLAIN ANALYZE.
async fn log_plan(
    pool: &PgPool,
    label: &str,
    sql: &str,
    limit: Option<i64>,
) -> Result<(), sqlx::Error> {
    let explain = format!("EXPLAIN ANALYZE {sql}");
    let mut query = sqlx::query_scalar::<_, String>(&explain);
    if let Some(limit) = limit {
        query = query.bind(limit);
    }
    let lines = query.fetch_all(pool).await?;

    log::info!("EXPLAIN ANALYZE {}:", label);
    for line in lines {
        log::info!("  {}", line);
    }
    Ok(())
}

async fn fetch_rows<T>(
    pool: &PgPool,
    label: &str,
    sql: &str,
    limit: Option<i64>,
    analyze: bool,
) -> Result<Vec<Record>, StoreError>
where
    T: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin,
{
    if analyze {
        log_plan(pool, label, sql, limit).await?;
    }

    let mut query = sqlx::query_as::<_, T>(sql);
    if let Some(limit) = limit {
        query = query.bind(limit);
    }
    let rows = query.fetch_all(pool).await?;

    let records = rows
        .iter()
        .map(to_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

impl Store {
    /// Shared execution path for every aggregate: optional plan, real query,
    /// row mapping, and error-to-`None` conversion.
    async fn fetch_records<T>(
        &self,
        label: &str,
        sql: &str,
        limit: Option<i64>,
        analyze: bool,
    ) -> Option<Vec<Record>>
    where
        T: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin,
    {
        let result = match self.pool() {
            Ok(pool) => fetch_rows::<T>(pool, label, sql, limit, analyze).await,
            Err(err) => Err(err),
        };
        let records = Self::settle(label, result)?;
        log::debug!("{}: {} rows", label, records.len());
        Some(records)
    }

    /// Every room with its number of students, zero included, by room id.
    pub async fn rooms_with_student_count(&self, analyze: bool) -> Option<Vec<Record>> {
        self.fetch_records::<RoomStudentCount>(
            Aggregate::RoomsWithStudentCount.name(),
            ROOMS_WITH_STUDENT_COUNT,
            None,
            analyze,
        )
        .await
    }

    /// Occupied rooms with the youngest students on average.
    pub async fn rooms_with_lowest_average_age(
        &self,
        limit: i64,
        analyze: bool,
    ) -> Option<Vec<Record>> {
        self.fetch_records::<RoomSummary>(
            Aggregate::LowestAverageAgeRooms.name(),
            LOWEST_AVERAGE_AGE_ROOMS,
            Some(limit),
            analyze,
        )
        .await
    }

    /// Occupied rooms with the widest spread between oldest and youngest birthday.
    pub async fn rooms_with_largest_age_difference(
        &self,
        limit: i64,
        analyze: bool,
    ) -> Option<Vec<Record>> {
        self.fetch_records::<RoomSummary>(
            Aggregate::LargestAgeDifferenceRooms.name(),
            LARGEST_AGE_DIFFERENCE_ROOMS,
            Some(limit),
            analyze,
        )
        .await
    }

    /// Rooms whose students have more than one distinct sex value.
    pub async fn rooms_with_mixed_gender_students(&self, analyze: bool) -> Option<Vec<Record>> {
        self.fetch_records::<RoomSummary>(
            Aggregate::MixedGenderRooms.name(),
            MIXED_GENDER_ROOMS,
            None,
            analyze,
        )
        .await
    }

    /// Run one aggregate by identity. `limit` only applies to the ranking queries.
    pub async fn run_aggregate(
        &self,
        aggregate: Aggregate,
        limit: i64,
        analyze: bool,
    ) -> Option<Vec<Record>> {
        match aggregate {
            Aggregate::RoomsWithStudentCount => self.rooms_with_student_count(analyze).await,
            Aggregate::LowestAverageAgeRooms => {
                self.rooms_with_lowest_average_age(limit, analyze).await
            }
            Aggregate::LargestAgeDifferenceRooms => {
                self.rooms_with_largest_age_difference(limit, analyze).await
            }
            Aggregate::MixedGenderRooms => self.rooms_with_mixed_gender_students(analyze).await,
        }
    }
}
