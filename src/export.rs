//! Export orchestration: run each aggregate and hand its rows to a sink.

use crate::db::{Aggregate, DEFAULT_RANKING_LIMIT, Store};
use crate::models::Record;
use crate::sink::Sink;
use std::path::PathBuf;

/// Something that can evaluate the fixed aggregates.
#[allow(async_fn_in_trait)]
pub trait AggregateSource {
    async fn aggregate(
        &self,
        aggregate: Aggregate,
        limit: i64,
        analyze: bool,
    ) -> Option<Vec<Record>>;
}

impl AggregateSource for Store {
    async fn aggregate(
        &self,
        aggregate: Aggregate,
        limit: i64,
        analyze: bool,
    ) -> Option<Vec<Record>> {
        self.run_aggregate(aggregate, limit, analyze).await
    }
}

/// Result of exporting a single aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written(PathBuf),
    /// The sink wrote nothing (empty result, unsupported format or write error)
    Skipped,
    /// The query produced no result, so the sink was not called
    Failed,
}

/// What happened to each aggregate during an export run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: Vec<(Aggregate, PathBuf)>,
    /// Aggregates whose query failed, so no sink call was made
    pub failed: Vec<Aggregate>,
    /// Aggregates the sink declined or could not write
    pub skipped: Vec<Aggregate>,
}

#[derive(Debug, Clone)]
pub struct Exporter {
    format: String,
    analyze: bool,
    limit: i64,
}

impl Exporter {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            analyze: false,
            limit: DEFAULT_RANKING_LIMIT,
        }
    }

    /// Log the query plan of every aggregate before running it.
    pub fn with_analyze(mut self, analyze: bool) -> Self {
        self.analyze = analyze;
        self
    }

    /// Row limit for the ranking aggregates.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Run and export one aggregate.
    pub async fn export(
        &self,
        aggregate: Aggregate,
        store: &impl AggregateSource,
        sink: &impl Sink,
    ) -> ExportOutcome {
        let Some(records) = store.aggregate(aggregate, self.limit, self.analyze).await else {
            log::warn!("{}: no result, export skipped", aggregate);
            return ExportOutcome::Failed;
        };

        match sink.write(&records, aggregate.name(), &self.format) {
            Ok(Some(path)) => ExportOutcome::Written(path),
            Ok(None) => ExportOutcome::Skipped,
            Err(err) => {
                log::error!("{}: export failed: {}", aggregate, err);
                ExportOutcome::Skipped
            }
        }
    }

    /// Export all four aggregates. A failure in one never stops the others.
    pub async fn export_all(
        &self,
        store: &impl AggregateSource,
        sink: &impl Sink,
    ) -> ExportSummary {
        let mut summary = ExportSummary::default();

        for aggregate in Aggregate::ALL {
            match self.export(aggregate, store, sink).await {
                ExportOutcome::Written(path) => summary.written.push((aggregate, path)),
                ExportOutcome::Skipped => summary.skipped.push(aggregate),
                ExportOutcome::Failed => summary.failed.push(aggregate),
            }
        }

        log::info!(
            "export finished: {} written, {} skipped, {} failed",
            summary.written.len(),
            summary.skipped.len(),
            summary.failed.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::sink::FileSink;
    use serde_json::json;
    use std::cell::RefCell;

    struct CannedAggregates {
        failing: Vec<Aggregate>,
        seen: RefCell<Vec<(Aggregate, i64, bool)>>,
    }

    impl CannedAggregates {
        fn new(failing: Vec<Aggregate>) -> Self {
            Self {
                failing,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl AggregateSource for CannedAggregates {
        async fn aggregate(
            &self,
            aggregate: Aggregate,
            limit: i64,
            analyze: bool,
        ) -> Option<Vec<Record>> {
            self.seen.borrow_mut().push((aggregate, limit, analyze));
            if self.failing.contains(&aggregate) {
                return None;
            }
            let row = json!({"room_id": 1, "room_name": "Room #1"});
            Some(vec![row.as_object().cloned().expect("object")])
        }
    }

    struct RejectingSink;

    impl Sink for RejectingSink {
        fn write(
            &self,
            _records: &[Record],
            _name: &str,
            _format: &str,
        ) -> Result<Option<PathBuf>, SinkError> {
            Err(SinkError::Xml("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn writes_one_file_per_aggregate_named_after_it() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());
        let store = CannedAggregates::new(Vec::new());

        let summary = Exporter::new("json").export_all(&store, &sink).await;

        assert_eq!(summary.written.len(), 4);
        for (aggregate, path) in &summary.written {
            assert_eq!(
                path.file_name().and_then(|n| n.to_str()),
                Some(format!("{}.json", aggregate.name()).as_str())
            );
        }
    }

    #[tokio::test]
    async fn failed_query_skips_sink_and_continues() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());
        let store = CannedAggregates::new(vec![Aggregate::LowestAverageAgeRooms]);

        let summary = Exporter::new("xml").export_all(&store, &sink).await;

        assert_eq!(summary.failed, [Aggregate::LowestAverageAgeRooms]);
        assert_eq!(summary.written.len(), 3);
        assert!(!dir.path().join("lowest_average_age_rooms.xml").exists());
        assert_eq!(store.seen.borrow().len(), 4);
    }

    #[tokio::test]
    async fn forwards_analyze_flag_and_limit() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path());
        let store = CannedAggregates::new(Vec::new());

        Exporter::new("json")
            .with_analyze(true)
            .with_limit(3)
            .export_all(&store, &sink)
            .await;

        assert!(store.seen.borrow().iter().all(|(_, limit, analyze)| *limit == 3 && *analyze));
    }

    #[tokio::test]
    async fn unsupported_format_is_skipped_for_every_aggregate() {
        let dir = tempfile::tempdir().expect("temp dir");
        let sink = FileSink::new(dir.path().join("results"));
        let store = CannedAggregates::new(Vec::new());

        let summary = Exporter::new("yaml").export_all(&store, &sink).await;

        assert!(summary.written.is_empty());
        assert_eq!(summary.skipped.len(), 4);
        assert!(!dir.path().join("results").exists());
    }

    #[tokio::test]
    async fn sink_errors_do_not_abort_the_run() {
        let store = CannedAggregates::new(Vec::new());

        let summary = Exporter::new("json").export_all(&store, &RejectingSink).await;

        assert_eq!(summary.skipped.len(), 4);
        assert_eq!(store.seen.borrow().len(), 4);
    }
}
