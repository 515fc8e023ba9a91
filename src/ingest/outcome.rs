//! Per-file outcomes and pass-level accounting

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::info;

/// What happened to one crawled file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Extracted, embedded, and written to the index
    Indexed { chunks: usize },
    /// Watermark matched; the stored version is current
    SkippedUnchanged,
    /// Extraction produced no usable text
    SkippedEmpty,
    /// No registered extractor claims the file
    SkippedUnsupported,
    /// Shutdown was requested before the file completed
    SkippedStopped,
    /// Extraction or indexing failed; the pass continues
    Failed,
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestOutcome::Indexed { chunks } => write!(f, "indexed ({} chunks)", chunks),
            IngestOutcome::SkippedUnchanged => write!(f, "skipped (unchanged)"),
            IngestOutcome::SkippedEmpty => write!(f, "skipped (empty)"),
            IngestOutcome::SkippedUnsupported => write!(f, "skipped (unsupported)"),
            IngestOutcome::SkippedStopped => write!(f, "skipped (stopped)"),
            IngestOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Final counts for one ingestion pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub processed: u64,
    pub indexed: u64,
    pub chunks: u64,
    pub skipped_unchanged: u64,
    pub skipped_empty: u64,
    pub skipped_unsupported: u64,
    pub skipped_stopped: u64,
    pub failed: u64,
    pub elapsed_secs: u64,
}

impl RunReport {
    pub fn log_summary(&self) {
        info!(
            processed = self.processed,
            indexed = self.indexed,
            chunks = self.chunks,
            skipped_unchanged = self.skipped_unchanged,
            skipped_empty = self.skipped_empty,
            skipped_unsupported = self.skipped_unsupported,
            skipped_stopped = self.skipped_stopped,
            failed = self.failed,
            elapsed_secs = self.elapsed_secs,
            "ingestion pass summary"
        );
    }
}

/// Lock-free counters shared by all workers in a pass
pub struct RunStats {
    processed: AtomicU64,
    indexed: AtomicU64,
    chunks: AtomicU64,
    skipped_unchanged: AtomicU64,
    skipped_empty: AtomicU64,
    skipped_unsupported: AtomicU64,
    skipped_stopped: AtomicU64,
    failed: AtomicU64,
    started: Instant,
    progress_every_files: u64,
    progress_every_secs: u64,
    last_progress: Mutex<Instant>,
}

impl RunStats {
    pub fn new(progress_every_files: u64, progress_every_secs: u64) -> Self {
        let now = Instant::now();
        Self {
            processed: AtomicU64::new(0),
            indexed: AtomicU64::new(0),
            chunks: AtomicU64::new(0),
            skipped_unchanged: AtomicU64::new(0),
            skipped_empty: AtomicU64::new(0),
            skipped_unsupported: AtomicU64::new(0),
            skipped_stopped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started: now,
            progress_every_files,
            progress_every_secs,
            last_progress: Mutex::new(now),
        }
    }

    pub fn record(&self, outcome: &IngestOutcome) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            IngestOutcome::Indexed { chunks } => {
                self.indexed.fetch_add(1, Ordering::Relaxed);
                self.chunks.fetch_add(*chunks as u64, Ordering::Relaxed);
            }
            IngestOutcome::SkippedUnchanged => {
                self.skipped_unchanged.fetch_add(1, Ordering::Relaxed);
            }
            IngestOutcome::SkippedEmpty => {
                self.skipped_empty.fetch_add(1, Ordering::Relaxed);
            }
            IngestOutcome::SkippedUnsupported => {
                self.skipped_unsupported.fetch_add(1, Ordering::Relaxed);
            }
            IngestOutcome::SkippedStopped => {
                self.skipped_stopped.fetch_add(1, Ordering::Relaxed);
            }
            IngestOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Emit a progress line when either the file-count or the time interval
    /// has elapsed since the last one
    pub fn maybe_log_progress(&self) {
        let processed = self.processed.load(Ordering::Relaxed);
        let by_count =
            self.progress_every_files > 0 && processed % self.progress_every_files == 0;

        let by_time = {
            let mut last = match self.last_progress.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if self.progress_every_secs > 0
                && last.elapsed().as_secs() >= self.progress_every_secs
            {
                *last = Instant::now();
                true
            } else if by_count {
                *last = Instant::now();
                false
            } else {
                false
            }
        };

        if by_count || by_time {
            info!(
                processed,
                indexed = self.indexed.load(Ordering::Relaxed),
                failed = self.failed.load(Ordering::Relaxed),
                elapsed_secs = self.started.elapsed().as_secs(),
                "ingestion progress"
            );
        }
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            processed: self.processed.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            skipped_unchanged: self.skipped_unchanged.load(Ordering::Relaxed),
            skipped_empty: self.skipped_empty.load(Ordering::Relaxed),
            skipped_unsupported: self.skipped_unsupported.load(Ordering::Relaxed),
            skipped_stopped: self.skipped_stopped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            elapsed_secs: self.started.elapsed().as_secs(),
        }
    }
}
