//! # Statistics Module
//!
//! Collects metrics about a running scheduler.
//!
//! ## Overview
//!
//! The `StatCollector` is handed to the scheduler explicitly (see
//! [`SchedulerBuilder::with_stats`](crate::SchedulerBuilder::with_stats)) and
//! updated by the pipeline loops as work moves through the stages. It tracks
//! admission decisions, downloads, extraction output, item processing, errors
//! per stage and hand-offs that were dropped because a pool had already been
//! closed.
//!
//! ## Features
//!
//! - **Thread-Safe**: Uses atomic operations for concurrent metric updates
//! - **Export Formats**: JSON via `serde` and a plain-text `Display` report
//! - **Snapshot Capability**: Captures consistent state for reporting
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::StatCollector;
//! use std::sync::Arc;
//!
//! let stats = Arc::new(StatCollector::new());
//! let scheduler = SchedulerBuilder::new()
//!     .with_stats(Arc::clone(&stats))
//!     .build()?;
//!
//! println!("{}", stats.to_json_string_pretty()?);
//! println!("{}", stats);
//! ```

use crate::error::{ErrorKind, Result};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

/// The pool a hand-off was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Request,
    Response,
    Item,
    Error,
}

// A snapshot of the current statistics, used for reporting.
struct StatsSnapshot {
    requests_admitted: usize,
    requests_rejected: usize,
    responses_fetched: usize,
    responses_analyzed: usize,
    bytes_downloaded: usize,
    items_produced: usize,
    items_processed: usize,
    errors_reported: usize,
    error_counts: BTreeMap<ErrorKind, usize>,
    requeued: [usize; 3],
    dropped: [usize; 4],
    elapsed_duration: Duration,
}

/// Collects statistics about the scheduler's operation.
#[derive(Debug, Serialize)]
pub struct StatCollector {
    #[serde(skip)]
    pub start_time: Instant,

    // Admission
    pub requests_admitted: AtomicUsize,
    pub requests_rejected: AtomicUsize,

    // Download and extraction
    pub responses_fetched: AtomicUsize,
    pub responses_analyzed: AtomicUsize,
    pub bytes_downloaded: AtomicUsize,
    pub items_produced: AtomicUsize,

    // Processing
    pub items_processed: AtomicUsize,

    // Errors, by the stage they are attributed to
    pub errors_reported: AtomicUsize,
    pub error_counts: Arc<dashmap::DashMap<ErrorKind, usize>>,

    // Work put back after no module could be selected for it
    pub requeued_requests: AtomicUsize,
    pub requeued_responses: AtomicUsize,
    pub requeued_items: AtomicUsize,

    // Hand-offs dropped because the target pool was closed
    pub dropped_requests: AtomicUsize,
    pub dropped_responses: AtomicUsize,
    pub dropped_items: AtomicUsize,
    pub dropped_errors: AtomicUsize,
}

impl StatCollector {
    /// Creates a new `StatCollector` with all counters initialized to zero.
    pub fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            requests_admitted: AtomicUsize::new(0),
            requests_rejected: AtomicUsize::new(0),
            responses_fetched: AtomicUsize::new(0),
            responses_analyzed: AtomicUsize::new(0),
            bytes_downloaded: AtomicUsize::new(0),
            items_produced: AtomicUsize::new(0),
            items_processed: AtomicUsize::new(0),
            errors_reported: AtomicUsize::new(0),
            error_counts: Arc::new(dashmap::DashMap::new()),
            requeued_requests: AtomicUsize::new(0),
            requeued_responses: AtomicUsize::new(0),
            requeued_items: AtomicUsize::new(0),
            dropped_requests: AtomicUsize::new(0),
            dropped_responses: AtomicUsize::new(0),
            dropped_items: AtomicUsize::new(0),
            dropped_errors: AtomicUsize::new(0),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let error_counts = self
            .error_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        StatsSnapshot {
            requests_admitted: self.requests_admitted.load(Ordering::SeqCst),
            requests_rejected: self.requests_rejected.load(Ordering::SeqCst),
            responses_fetched: self.responses_fetched.load(Ordering::SeqCst),
            responses_analyzed: self.responses_analyzed.load(Ordering::SeqCst),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::SeqCst),
            items_produced: self.items_produced.load(Ordering::SeqCst),
            items_processed: self.items_processed.load(Ordering::SeqCst),
            errors_reported: self.errors_reported.load(Ordering::SeqCst),
            error_counts,
            requeued: [
                self.requeued_requests.load(Ordering::SeqCst),
                self.requeued_responses.load(Ordering::SeqCst),
                self.requeued_items.load(Ordering::SeqCst),
            ],
            dropped: [
                self.dropped_requests.load(Ordering::SeqCst),
                self.dropped_responses.load(Ordering::SeqCst),
                self.dropped_items.load(Ordering::SeqCst),
                self.dropped_errors.load(Ordering::SeqCst),
            ],
            elapsed_duration: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_requests_admitted(&self) {
        self.requests_admitted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_responses_fetched(&self) {
        self.responses_fetched.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_responses_analyzed(&self) {
        self.responses_analyzed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn add_bytes_downloaded(&self, bytes: usize) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_produced(&self) {
        self.items_produced.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::SeqCst);
    }

    /// Records an error attributed to `kind`.
    pub(crate) fn record_error(&self, kind: ErrorKind) {
        self.errors_reported.fetch_add(1, Ordering::SeqCst);
        *self.error_counts.entry(kind).or_insert(0) += 1;
    }

    /// Records work put back into the `stage` pool for another selection.
    pub(crate) fn record_requeued(&self, stage: Stage) {
        if let Some(counter) = self.requeued_counter(stage) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn requeued_counter(&self, stage: Stage) -> Option<&AtomicUsize> {
        match stage {
            Stage::Request => Some(&self.requeued_requests),
            Stage::Response => Some(&self.requeued_responses),
            Stage::Item => Some(&self.requeued_items),
            Stage::Error => None,
        }
    }

    /// Records a hand-off to `stage` that could not be delivered.
    pub(crate) fn record_dropped(&self, stage: Stage) {
        let counter = match stage {
            Stage::Request => &self.dropped_requests,
            Stage::Response => &self.dropped_responses,
            Stage::Item => &self.dropped_items,
            Stage::Error => &self.dropped_errors,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn errors_of(&self, kind: ErrorKind) -> usize {
        self.error_counts.get(&kind).map(|count| *count).unwrap_or(0)
    }

    /// Errors are never put back, so `Stage::Error` always reads zero.
    pub fn requeued(&self, stage: Stage) -> usize {
        self.requeued_counter(stage)
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn dropped(&self, stage: Stage) -> usize {
        let counter = match stage {
            Stage::Request => &self.dropped_requests,
            Stage::Response => &self.dropped_responses,
            Stage::Item => &self.dropped_items,
            Stage::Error => &self.dropped_errors,
        };
        counter.load(Ordering::SeqCst)
    }

    /// Converts the statistics into a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Converts the statistics into a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nScheduler Statistics")?;
        writeln!(f, "--------------------")?;
        writeln!(f, "  duration : {:?}", snapshot.elapsed_duration)?;
        writeln!(
            f,
            "  requests : admitted: {}, rejected: {}",
            snapshot.requests_admitted, snapshot.requests_rejected
        )?;
        writeln!(
            f,
            "  response : fetched: {}, analyzed: {}, downloaded: {} bytes",
            snapshot.responses_fetched, snapshot.responses_analyzed, snapshot.bytes_downloaded
        )?;
        writeln!(
            f,
            "  items    : produced: {}, processed: {}",
            snapshot.items_produced, snapshot.items_processed
        )?;

        let errors = if snapshot.error_counts.is_empty() {
            "none".to_string()
        } else {
            snapshot
                .error_counts
                .iter()
                .map(|(kind, count)| format!("{}: {}", kind, count))
                .collect::<Vec<String>>()
                .join(", ")
        };
        writeln!(f, "  errors   : {} ({})", snapshot.errors_reported, errors)?;
        writeln!(
            f,
            "  requeued : requests: {}, responses: {}, items: {}",
            snapshot.requeued[0], snapshot.requeued[1], snapshot.requeued[2]
        )?;
        writeln!(
            f,
            "  dropped  : requests: {}, responses: {}, items: {}, errors: {}\n",
            snapshot.dropped[0], snapshot.dropped[1], snapshot.dropped[2], snapshot.dropped[3]
        )
    }
}
