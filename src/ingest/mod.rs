//! Ingestion pipeline coordination
//!
//! One pass crawls the drive, feeds candidate files to a bounded worker
//! pool, and replaces changed documents in the vector index. Passes are
//! idempotent: unchanged files are skipped by watermark, and re-ingesting
//! identical content rewrites identical points.

mod outcome;

pub use outcome::{IngestOutcome, RunReport, RunStats};

use crate::config::Config;
use crate::crawl::{CrawlScope, Crawler};
use crate::drive::{ApiError, DriveClient, DriveFile};
use crate::error::{Error, Result};
use crate::extract::{ExtractSettings, ExtractionContext, ExtractorRegistry};
use crate::limiter::RateLimiter;
use crate::retry::RetryExecutor;
use crate::store::QdrantStore;
use crate::sync::{DocumentRecord, IndexSync};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Crawl-to-worker channel depth. Small enough that cancellation drains fast.
const STREAM_BUFFER: usize = 64;

/// Drives ingestion passes over the configured drive scope
pub struct IngestCoordinator {
    config: Arc<Config>,
    registry: Arc<ExtractorRegistry>,
    store: Arc<QdrantStore>,
    sync: Arc<IndexSync>,
    limiter: RateLimiter,
    cancel: CancellationToken,
}

impl IngestCoordinator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<QdrantStore>,
        sync: Arc<IndexSync>,
        cancel: CancellationToken,
    ) -> Self {
        let registry = Arc::new(ExtractorRegistry::from_config(&config.formats));
        let limiter = RateLimiter::new(config.rate_limit.rps, config.rate_limit.burst);
        Self {
            config,
            registry,
            store,
            sync,
            limiter,
            cancel,
        }
    }

    /// Run a single ingestion pass and return its report.
    ///
    /// A fatal listing failure aborts the pass; per-file failures are counted
    /// and the pass continues.
    pub async fn run_once(&self) -> Result<RunReport> {
        let pass_cancel = self.cancel.child_token();
        let stats = Arc::new(RunStats::new(
            self.config.ingest.progress_every_files,
            self.config.ingest.progress_every_secs,
        ));

        let crawler = Crawler::new(
            DriveClient::new(&self.config.drive)?,
            RetryExecutor::new(&self.config.retry, self.limiter.clone(), pass_cancel.clone()),
            pass_cancel.clone(),
            CrawlScope::from_config(&self.config.drive),
        );
        let stream = crawler.stream(self.registry.filter_terms(), STREAM_BUFFER);
        let stream = Arc::new(Mutex::new(stream));

        let workers = self.config.ingest.workers.max(1);
        info!(workers, "ingestion pass started");

        let mut pool: JoinSet<Result<()>> = JoinSet::new();
        for worker_id in 0..workers {
            let stream = stream.clone();
            let stats = stats.clone();
            let registry = self.registry.clone();
            let store = self.store.clone();
            let sync = self.sync.clone();
            let pass_cancel = pass_cancel.clone();
            let config = self.config.clone();
            let limiter = self.limiter.clone();

            pool.spawn(async move {
                let client = DriveClient::new(&config.drive)?;
                let retry = RetryExecutor::new(&config.retry, limiter, pass_cancel.clone());
                let ctx = ExtractionContext::new(
                    client,
                    retry,
                    pass_cancel.clone(),
                    ExtractSettings::from_config(&config),
                );

                loop {
                    let item = {
                        let mut stream = stream.lock().await;
                        stream.recv().await
                    };
                    let file = match item {
                        Some(Ok(file)) => file,
                        Some(Err(err)) => {
                            // Listing failure poisons the whole pass.
                            pass_cancel.cancel();
                            return Err(Error::Crawl(format!("listing failed: {}", err)));
                        }
                        None => return Ok(()),
                    };

                    let outcome =
                        process_file(&file, &ctx, &registry, &store, &sync, &pass_cancel).await;
                    debug!(
                        worker = worker_id,
                        file = file.display_name(),
                        outcome = %outcome,
                        "file processed"
                    );
                    stats.record(&outcome);
                    stats.maybe_log_progress();
                }
            });
        }
        drop(stream);

        let pass_failure = self.drain_pool(&mut pool).await;
        let report = stats.report();
        report.log_summary();

        match pass_failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Wait for the worker pool, honoring the shutdown grace period once the
    /// shared cancel token fires
    async fn drain_pool(&self, pool: &mut JoinSet<Result<()>>) -> Option<Error> {
        let grace = Duration::from_secs(self.config.ingest.shutdown_grace_secs);
        let mut failure = None;

        loop {
            let joined = if self.cancel.is_cancelled() {
                match tokio::time::timeout(grace, pool.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(
                            grace_secs = self.config.ingest.shutdown_grace_secs,
                            "workers did not stop within the grace period, abandoning them"
                        );
                        pool.abort_all();
                        break;
                    }
                }
            } else {
                // Stay cancel-aware while parked so the grace timer arms as
                // soon as shutdown is requested, not after the next join.
                tokio::select! {
                    _ = self.cancel.cancelled() => continue,
                    joined = pool.join_next() => joined,
                }
            };

            match joined {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(err))) => {
                    if failure.is_none() && !matches!(err, Error::ShutdownRequested) {
                        failure = Some(err);
                    }
                }
                Some(Err(join_err)) if join_err.is_cancelled() => {}
                Some(Err(join_err)) => {
                    if failure.is_none() {
                        failure = Some(Error::Other(format!("worker panicked: {}", join_err)));
                    }
                }
                None => break,
            }
        }
        failure
    }

    /// Run passes forever with the configured poll interval between them.
    /// Passes never overlap; the next delay starts when the previous pass
    /// ends. A single failed pass is retried on the next poll; consecutive
    /// failures abort the loop since they indicate a systemic problem such
    /// as revoked credentials.
    pub async fn run_loop(&self) -> Result<()> {
        let poll = Duration::from_secs(self.config.ingest.poll_secs);
        let mut failed_passes: u32 = 0;
        loop {
            match self.run_once().await {
                Ok(_) => failed_passes = 0,
                Err(err) => {
                    failed_passes += 1;
                    if failed_passes >= 2 {
                        error!(error = %err, "consecutive ingestion passes failed, stopping");
                        return Err(err);
                    }
                    warn!(error = %err, "ingestion pass failed");
                }
            }

            if self.cancel.is_cancelled() {
                return Ok(());
            }

            info!(poll_secs = self.config.ingest.poll_secs, "pass complete, waiting");
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }
}

/// Per-file pipeline: watermark, extract, replace
async fn process_file(
    file: &DriveFile,
    ctx: &ExtractionContext,
    registry: &ExtractorRegistry,
    store: &QdrantStore,
    sync: &IndexSync,
    cancel: &CancellationToken,
) -> IngestOutcome {
    if cancel.is_cancelled() {
        return IngestOutcome::SkippedStopped;
    }

    // Watermark probe first: identical (file, revision) pairs are already
    // indexed and skip before any extractor lookup.
    if let Some(modified) = file.modified_time.as_deref() {
        match store.has_file_version(&file.id, modified).await {
            Ok(true) => return IngestOutcome::SkippedUnchanged,
            Ok(false) => {}
            Err(err) => {
                warn!(file = file.display_name(), error = %err, "watermark probe failed");
                return IngestOutcome::Failed;
            }
        }
    }

    let Some(extractor) = registry.resolve(file) else {
        return IngestOutcome::SkippedUnsupported;
    };

    let content = match extractor.extract(file, ctx).await {
        Ok(content) => content,
        Err(Error::Drive(ApiError::Shutdown)) | Err(Error::ShutdownRequested) => {
            return IngestOutcome::SkippedStopped;
        }
        Err(err) => {
            warn!(file = file.display_name(), error = %err, "extraction failed");
            return IngestOutcome::Failed;
        }
    };

    if content.is_empty() {
        return IngestOutcome::SkippedEmpty;
    }

    let record = DocumentRecord {
        file_id: file.id.clone(),
        file_name: file.display_name().to_string(),
        file_type: content.file_type.clone(),
        source: format!("gdrive://{}", file.id),
        modified_time: file.modified_time.clone(),
        text: content.text,
        metadata: content.metadata,
    };

    match sync.replace_document(record).await {
        Ok(chunks) => IngestOutcome::Indexed { chunks },
        Err(Error::ShutdownRequested) => IngestOutcome::SkippedStopped,
        Err(err) => {
            warn!(file = file.display_name(), error = %err, "index replace failed");
            IngestOutcome::Failed
        }
    }
}
