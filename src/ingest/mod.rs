//! Batched ingestion of rooms and students.
//!
//! Records are drained from a [`RecordSource`](crate::source::RecordSource) in
//! fixed-size batches and each batch is handed to a [`BatchStore`] in one call:
//!
//! 1. **Batching** (`batch`) - groups the lazy record stream
//! 2. **Pipeline** (`pipeline`) - maps records to entities and flushes batches
//! 3. **Statistics** (`stats`) - per-file counters
//!
//! Rooms are always ingested to completion before any student batch is sent,
//! since students referencing a room that is not yet stored are dropped.

pub mod batch;
pub mod pipeline;
pub mod stats;

pub use batch::Batches;
pub use pipeline::{BatchStore, Ingestor, PopulateSummary};
pub use stats::IngestStats;
