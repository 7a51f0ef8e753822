//! Idempotent record sink with per-record failure isolation.

use crate::error::AppError;
use crate::models::{ItemRecord, RecordKey, WriteOutcome};
use crate::traits::RecordStore;

/// A record the store refused.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub key: RecordKey,
    pub error: String,
}

/// Tally of one batch write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub attempted: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failures: Vec<RecordFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapse the failures into a single error, if there were any.
    pub fn error(&self) -> Option<AppError> {
        let first = self.failures.first()?;
        Some(AppError::PersistenceBatch {
            failed: self.failures.len(),
            attempted: self.attempted,
            first_error: format!("{}: {}", first.key, first.error),
        })
    }
}

/// Writes records through a [`RecordStore`], tolerating duplicates and
/// isolating failures so one bad record never blocks its siblings.
#[derive(Clone)]
pub struct IdempotentSink<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> IdempotentSink<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Write a single record. A duplicate key is a successful no-op.
    pub async fn write(&self, record: &ItemRecord) -> Result<WriteOutcome, AppError> {
        let outcome = self.store.write(record).await?;
        if outcome == WriteOutcome::Duplicate {
            tracing::debug!(key = %record.key(), "Record already stored");
        }
        Ok(outcome)
    }

    /// Attempt every record, then report. Never short-circuits.
    pub async fn write_batch(&self, records: &[ItemRecord]) -> BatchReport {
        let mut report = BatchReport {
            attempted: records.len(),
            ..BatchReport::default()
        };

        for record in records {
            match self.write(record).await {
                Ok(WriteOutcome::Inserted) => report.inserted += 1,
                Ok(WriteOutcome::Duplicate) => report.duplicates += 1,
                Err(e) => {
                    let key = record.key();
                    tracing::warn!(%key, error = %e, "Failed to persist record");
                    report.failures.push(RecordFailure {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.is_clean() {
            tracing::error!(
                attempted = report.attempted,
                failed = report.failures.len(),
                "Batch persisted with failures"
            );
        }

        report
    }
}
