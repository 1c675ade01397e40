use super::batch::Batches;
use super::stats::IngestStats;
use crate::config::DEFAULT_BATCH_SIZE;
use crate::db::{Store, StudentBatchOutcome};
use crate::error::{RecordError, SourceError};
use crate::models::{Record, Room, Student};
use crate::source::RecordSource;
use std::path::Path;

/// Destination for entity batches.
#[allow(async_fn_in_trait)]
pub trait BatchStore {
    /// Returns rows inserted, or `None` if the batch was rolled back.
    async fn write_rooms(&self, rooms: &[Room]) -> Option<usize>;

    /// Returns inserted/rejected counts, or `None` if the batch was rolled back.
    async fn write_students(&self, students: &[Student]) -> Option<StudentBatchOutcome>;
}

impl BatchStore for Store {
    async fn write_rooms(&self, rooms: &[Room]) -> Option<usize> {
        self.insert_rooms(rooms).await
    }

    async fn write_students(&self, students: &[Student]) -> Option<StudentBatchOutcome> {
        self.insert_students(students).await
    }
}

/// Outcome of ingesting both files. `None` means the file could not be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    pub rooms: Option<IngestStats>,
    pub students: Option<IngestStats>,
}

/// An entity that can be ingested from a record source in batches.
#[allow(async_fn_in_trait)]
trait Entity: TryFrom<Record, Error = RecordError> {
    const KIND: &'static str;

    async fn write(store: &impl BatchStore, batch: &[Self]) -> Option<StudentBatchOutcome>;
}

impl Entity for Room {
    const KIND: &'static str = "room";

    async fn write(store: &impl BatchStore, batch: &[Self]) -> Option<StudentBatchOutcome> {
        store
            .write_rooms(batch)
            .await
            .map(|inserted| StudentBatchOutcome {
                inserted,
                rejected: 0,
            })
    }
}

impl Entity for Student {
    const KIND: &'static str = "student";

    async fn write(store: &impl BatchStore, batch: &[Self]) -> Option<StudentBatchOutcome> {
        store.write_students(batch).await
    }
}

/// Split a raw batch into mapped entities, stopping at the first stream error.
fn map_batch<T: Entity>(
    raw: Vec<Result<Record, SourceError>>,
    stats: &mut IngestStats,
) -> (Vec<T>, Option<SourceError>) {
    let mut entities = Vec::with_capacity(raw.len());

    for item in raw {
        let record = match item {
            Ok(record) => record,
            Err(err) => return (entities, Some(err)),
        };
        stats.records += 1;
        match T::try_from(record) {
            Ok(entity) => entities.push(entity),
            Err(err) => {
                stats.invalid += 1;
                log::warn!("skipping {} record {}: {}", T::KIND, stats.records, err);
            }
        }
    }

    (entities, None)
}

/// Drives record sources into the store in fixed-size batches.
#[derive(Debug, Clone, Copy)]
pub struct Ingestor {
    batch_size: usize,
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl Ingestor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Ingest every room in `path`. A read error stops the file after flushing
    /// the records read so far.
    pub async fn ingest_rooms(
        &self,
        source: &impl RecordSource,
        store: &impl BatchStore,
        path: &Path,
    ) -> Result<IngestStats, SourceError> {
        self.ingest::<Room>(source, store, path).await
    }

    /// Ingest every student in `path`. Students whose room does not exist are
    /// dropped by the store and counted as rejected.
    pub async fn ingest_students(
        &self,
        source: &impl RecordSource,
        store: &impl BatchStore,
        path: &Path,
    ) -> Result<IngestStats, SourceError> {
        self.ingest::<Student>(source, store, path).await
    }

    async fn ingest<T: Entity>(
        &self,
        source: &impl RecordSource,
        store: &impl BatchStore,
        path: &Path,
    ) -> Result<IngestStats, SourceError> {
        let mut stats = IngestStats::default();
        let records = source.stream(path).inspect_err(|err| {
            log::error!("{} ingestion from {} failed: {}", T::KIND, path.display(), err);
        })?;

        for raw in Batches::new(records, self.batch_size) {
            let (batch, failure) = map_batch::<T>(raw, &mut stats);

            if !batch.is_empty() {
                stats.batches += 1;
                match T::write(store, &batch).await {
                    Some(outcome) => {
                        stats.inserted += outcome.inserted;
                        stats.rejected += outcome.rejected;
                    }
                    None => stats.failed_batches += 1,
                }
            }

            if let Some(err) = failure {
                log::error!("{} ingestion from {} aborted: {}", T::KIND, path.display(), err);
                return Err(err);
            }
        }

        log::info!("{}s from {}: {}", T::KIND, path.display(), stats);
        Ok(stats)
    }

    /// Ingest all rooms, then all students.
    ///
    /// A failure to read the rooms file is reported and students are still
    /// attempted; they will be rejected unless their rooms were stored earlier.
    pub async fn populate(
        &self,
        source: &impl RecordSource,
        store: &impl BatchStore,
        rooms_path: &Path,
        students_path: &Path,
    ) -> PopulateSummary {
        let rooms = self.ingest_rooms(source, store, rooms_path).await.ok();
        let students = self.ingest_students(source, store, students_path).await.ok();

        let summary = PopulateSummary { rooms, students };
        log::info!("ingestion finished: {}", summary.total());
        summary
    }
}

impl PopulateSummary {
    /// Counters summed over whichever files were read.
    pub fn total(&self) -> IngestStats {
        let mut total = IngestStats::default();
        for stats in [self.rooms, self.students].into_iter().flatten() {
            total.merge(stats);
        }
        total
    }
}
