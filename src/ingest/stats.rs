//! Ingestion statistics tracking.

/// Counters for one ingested file (or several, after `merge`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Records read from the source
    pub records: usize,
    /// Records that could not be mapped into an entity
    pub invalid: usize,
    /// Batches handed to the store
    pub batches: usize,
    /// Batches the store rolled back
    pub failed_batches: usize,
    /// Rows actually inserted
    pub inserted: usize,
    /// Students dropped for referencing a missing room
    pub rejected: usize,
}

impl IngestStats {
    /// Sum another set of counters into this one.
    pub fn merge(&mut self, other: IngestStats) {
        self.records += other.records;
        self.invalid += other.invalid;
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
        self.inserted += other.inserted;
        self.rejected += other.rejected;
    }
}

impl std::fmt::Display for IngestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records, {} invalid, {} inserted, {} rejected, {}/{} batches failed",
            self.records,
            self.invalid,
            self.inserted,
            self.rejected,
            self.failed_batches,
            self.batches
        )
    }
}
