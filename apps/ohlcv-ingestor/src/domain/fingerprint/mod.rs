//! Content Fingerprints and Duplicate Suppression
//!
//! The upstream transport is at-least-once: the same logical candle may
//! be redelivered on reconnect or retry, and the destination table is
//! append-only with no natural key to reject conflicts. Suppression
//! therefore happens here, before the sink, keyed by a deterministic
//! digest over the record's semantic fields.
//!
//! # Canonical encoding
//!
//! The digest input is the seven fields joined with `-` in fixed order:
//!
//! ```text
//! {time_ms}-{symbol}-{open}-{high}-{low}-{close}-{volume}
//! ```
//!
//! Each decimal is rendered through [`Decimal::normalize`] and then
//! `to_string()`: plain notation, trailing zeros stripped, no locale, no
//! rounding. Logically equal values (`100`, `100.0`, `100.00`)
//! fingerprint identically; any value difference changes the digest.
//! This rule must not drift between versions or duplicate leakage
//! reopens.
//!
//! The encoding assumes symbols never contain the `-` separator, which
//! holds for exchange tickers (`BTCUSDT`). A symbol carrying the
//! separator could collide with a neighboring field's encoding.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::domain::candle::CandleRecord;

/// SHA-256 digest over a record's canonical field encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a candle record.
    #[must_use]
    pub fn of(record: &CandleRecord) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_string(record).as_bytes());
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Canonical string encoding hashed into a [`Fingerprint`].
///
/// Exposed so tests can pin the exact format; production code should
/// only go through [`Fingerprint::of`].
#[must_use]
pub fn canonical_string(record: &CandleRecord) -> String {
    format!(
        "{}-{}-{}-{}-{}-{}-{}",
        record.time_ms,
        record.symbol,
        record.open.normalize(),
        record.high.normalize(),
        record.low.normalize(),
        record.close.normalize(),
        record.volume.normalize(),
    )
}

/// Outcome of offering a record to the deduplicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting within the window; record proceeds downstream.
    Admitted,
    /// Fingerprint already seen; record must be dropped.
    Duplicate,
}

/// Time-windowed fingerprint membership set.
///
/// Bounded replacement for an ever-growing global set: entries older
/// than the configured window (the maximum plausible redelivery delay)
/// are evicted in arrival order before each membership test. One
/// `DedupWindow` is owned by exactly one pipeline worker and is torn
/// down with it; check-then-insert is a single `&mut self` call, so no
/// two records can race past the membership test within a worker.
#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    seen: HashSet<Fingerprint>,
    arrivals: VecDeque<(Instant, Fingerprint)>,
}

impl DedupWindow {
    /// Create an empty window keeping fingerprints for `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashSet::new(),
            arrivals: VecDeque::new(),
        }
    }

    /// Test-and-insert a record's fingerprint.
    ///
    /// Evicts expired entries, then admits the record iff its
    /// fingerprint is not a member. Admitted fingerprints are inserted
    /// atomically with the lookup.
    pub fn admit(&mut self, record: &CandleRecord) -> Admission {
        self.admit_at(Fingerprint::of(record), Instant::now())
    }

    /// Number of fingerprints currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the window holds no fingerprints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn admit_at(&mut self, fingerprint: Fingerprint, now: Instant) -> Admission {
        self.evict_before(now);

        if self.seen.contains(&fingerprint) {
            return Admission::Duplicate;
        }

        self.seen.insert(fingerprint);
        self.arrivals.push_back((now, fingerprint));
        Admission::Admitted
    }

    fn evict_before(&mut self, now: Instant) {
        while let Some(&(arrived, fingerprint)) = self.arrivals.front() {
            if now.duration_since(arrived) < self.window {
                break;
            }
            self.arrivals.pop_front();
            self.seen.remove(&fingerprint);
        }
    }
}
