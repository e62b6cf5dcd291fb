use crate::harvester::types::ClassifiedTransaction;
use crate::harvester::writer_backend::{LedgerWriter, WriterError};
use std::collections::HashSet;

/// Deduplicating, append-only front of the ledger sink.
///
/// The seen-set is seeded from the sink on open so a resumed run never
/// writes a signature a previous run already persisted.
pub struct LedgerAggregator {
    writer: Box<dyn LedgerWriter>,
    seen: HashSet<String>,
    persisted: usize,
    sort_by_timestamp: bool,
}

impl LedgerAggregator {
    pub async fn open(mut writer: Box<dyn LedgerWriter>, sort_by_timestamp: bool) -> Result<Self, WriterError> {
        let existing = writer.existing_signatures().await?;
        let seen: HashSet<String> = existing.into_iter().collect();

        log::info!(
            "📊 Ledger backend: {} ({} rows already recorded)",
            writer.backend_type(),
            seen.len()
        );

        Ok(Self {
            writer,
            seen,
            persisted: 0,
            sort_by_timestamp,
        })
    }

    pub fn has_seen(&self, signature: &str) -> bool {
        self.seen.contains(signature)
    }

    /// Rows persisted by this run; never decreases
    pub fn persisted_count(&self) -> usize {
        self.persisted
    }

    /// Rows in the ledger including earlier runs
    pub fn ledger_size(&self) -> usize {
        self.seen.len()
    }

    /// Persist the unseen records of one round, at most `limit` of them.
    /// Returns how many rows were written. Rows are durable on `Ok`.
    pub async fn persist_batch(
        &mut self,
        records: Vec<ClassifiedTransaction>,
        limit: Option<usize>,
    ) -> Result<usize, WriterError> {
        let mut batch_seen = HashSet::new();
        let mut fresh: Vec<ClassifiedTransaction> = records
            .into_iter()
            .filter(|r| !self.seen.contains(&r.signature) && batch_seen.insert(r.signature.clone()))
            .collect();

        if self.sort_by_timestamp {
            fresh.sort_by_key(|r| r.timestamp);
        }

        if let Some(limit) = limit {
            fresh.truncate(limit);
        }

        if fresh.is_empty() {
            return Ok(0);
        }

        self.writer.append(&fresh).await?;

        let written = fresh.len();
        self.seen.extend(fresh.into_iter().map(|r| r.signature));
        self.persisted += written;

        Ok(written)
    }
}
