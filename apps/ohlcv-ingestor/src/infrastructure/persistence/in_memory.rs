//! In-memory candle store for testing.
//!
//! Mirrors the PostgreSQL sink's semantics: per-row tolerance inside a
//! batch, whole-batch rollback on commit failure, and the empty batch as
//! a no-op. Failures are injectable so the pipeline's failure paths can
//! be exercised without a database.

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;

use crate::application::ports::{CandleStore, StoreError, WriteReport};
use crate::domain::candle::CandleRecord;

/// In-memory implementation of [`CandleStore`].
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCandleStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: RwLock<Vec<CandleRecord>>,
    /// Rows with this symbol fail row-level persistence.
    fail_symbol: RwLock<Option<String>>,
    /// Number of upcoming commits to fail.
    fail_commits: AtomicU32,
    commits: AtomicU64,
}

impl InMemoryCandleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows, in insertion order.
    #[must_use]
    pub fn rows(&self) -> Vec<CandleRecord> {
        self.inner.rows.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of transactions that reached a successful commit.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Make rows with `symbol` fail row-level persistence.
    pub fn fail_rows_with_symbol(&self, symbol: &str) {
        *self
            .inner
            .fail_symbol
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(symbol.to_string());
    }

    /// Make the next `n` commits fail (whole-batch rollback).
    pub fn fail_next_commits(&self, n: u32) {
        self.inner.fail_commits.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl CandleStore for InMemoryCandleStore {
    async fn ensure_schema(&self) {}

    async fn write(&self, batch: &[CandleRecord]) -> Result<WriteReport, StoreError> {
        if batch.is_empty() {
            return Ok(WriteReport::default());
        }

        let fail_symbol = self
            .inner
            .fail_symbol
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        // Stage rows first; nothing is visible until the commit below.
        let mut staged = Vec::with_capacity(batch.len());
        let mut report = WriteReport::default();
        for record in batch {
            if fail_symbol.as_deref() == Some(record.symbol.as_str()) {
                report.failed += 1;
            } else {
                staged.push(record.clone());
                report.accepted += 1;
            }
        }

        let remaining = self.inner.fail_commits.load(Ordering::SeqCst);
        if remaining > 0 {
            let _ = self.inner.fail_commits.compare_exchange(
                remaining,
                remaining.saturating_sub(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            return Err(StoreError::Commit("injected commit failure".to_string()));
        }

        self.inner
            .rows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(staged);
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(report)
    }
}
