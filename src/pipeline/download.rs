//! Parallel download stage with bounded concurrency.
//!
//! # Concurrency Model
//!
//! - Each routed record downloads in its own Tokio task
//! - A semaphore permit is acquired before spawning each task
//! - Permits are released when the task finishes (RAII)
//! - Results are slotted by input index, so result `i` belongs to record `i`

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::ConfigError;
use crate::provider::{ProductRecord, ProviderError, ProviderFactory, ProviderKind};
use crate::routing::ProductRouter;

use super::report::DownloadResult;
use super::retry::{RetryPolicy, classify_download_error, retry_with_policy};
use super::StageError;

/// Default number of concurrent downloads.
pub const DEFAULT_WORKERS: usize = 8;

/// Maximum allowed number of concurrent downloads.
pub const MAX_WORKERS: usize = 64;

/// Downloads product records through their owning providers.
pub struct DownloadStage {
    factory: Arc<dyn ProviderFactory>,
    router: Arc<ProductRouter>,
    workers: usize,
    retry_policy: RetryPolicy,
}

enum Slot {
    Ready(Result<PathBuf, StageError>),
    Running(JoinHandle<Result<PathBuf, StageError>>),
}

impl DownloadStage {
    /// Creates a download stage running at most `workers` downloads at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] when `workers` is outside `1..=64`.
    pub fn new(
        factory: Arc<dyn ProviderFactory>,
        router: Arc<ProductRouter>,
        workers: usize,
        retry_policy: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        if !(1..=MAX_WORKERS).contains(&workers) {
            return Err(ConfigError::out_of_range(
                "workers",
                workers,
                format!("1..={MAX_WORKERS}"),
            ));
        }
        debug!(
            workers,
            max_attempts = retry_policy.max_attempts(),
            "creating download stage"
        );
        Ok(Self {
            factory,
            router,
            workers,
            retry_policy,
        })
    }

    /// Configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Downloads every record, returning exactly one result per record in
    /// input order.
    ///
    /// Routing failures, provider failures and aborted tasks are captured in
    /// the corresponding result; this method itself never fails.
    #[instrument(skip(self, records), fields(records = records.len(), workers = self.workers))]
    pub async fn run_downloads(&self, records: Vec<ProductRecord>) -> Vec<DownloadResult> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut slots = Vec::with_capacity(records.len());

        info!("starting downloads");

        for record in &records {
            let route = match self.router.route_for_download(record) {
                Ok(route) => route,
                Err(error) => {
                    warn!(product = %record, error = %error, "record not routable");
                    slots.push(Slot::Ready(Err(error.into())));
                    continue;
                }
            };

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    slots.push(Slot::Ready(Err(StageError::task_aborted(
                        record.label(),
                        "worker pool closed",
                    ))));
                    continue;
                }
            };

            let factory = Arc::clone(&self.factory);
            let policy = self.retry_policy;
            let record = record.clone();

            slots.push(Slot::Running(tokio::spawn(async move {
                let _permit = permit;
                download_one(factory.as_ref(), route.kind, &record, route.output_dir, &policy)
                    .await
            })));
        }

        debug!(task_count = slots.len(), "waiting for downloads to complete");

        let mut results = Vec::with_capacity(records.len());
        for (record, slot) in records.into_iter().zip(slots) {
            let outcome = match slot {
                Slot::Ready(outcome) => outcome,
                Slot::Running(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_error) => {
                        warn!(product = %record, error = %join_error, "download task aborted");
                        Err(StageError::task_aborted(
                            record.label(),
                            join_error.to_string(),
                        ))
                    }
                },
            };
            results.push(match outcome {
                Ok(path) => DownloadResult::succeeded(record, path),
                Err(error) => DownloadResult::failed(record, error),
            });
        }

        let completed = results.iter().filter(|r| r.is_success()).count();
        info!(
            completed,
            failed = results.len() - completed,
            total = results.len(),
            "downloads complete"
        );
        results
    }
}

async fn download_one(
    factory: &dyn ProviderFactory,
    kind: ProviderKind,
    record: &ProductRecord,
    output_dir: PathBuf,
    policy: &RetryPolicy,
) -> Result<PathBuf, StageError> {
    tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(|e| ProviderError::io(output_dir.clone(), e))?;

    let output_dir = output_dir.as_path();
    let result = retry_with_policy(
        policy,
        "download",
        classify_download_error,
        |_attempt| async move {
            let client = factory.create(kind)?;
            client.download(record, output_dir).await
        },
    )
    .await;

    match result {
        Ok(path) => {
            info!(product = %record, path = %path.display(), "download completed");
            Ok(path)
        }
        Err((error, attempts)) => {
            warn!(product = %record, attempts, error = %error, "download failed");
            Err(error.into())
        }
    }
}

impl std::fmt::Debug for DownloadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStage")
            .field("router", &self.router)
            .field("workers", &self.workers)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}
