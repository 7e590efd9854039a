//! Per-record download results and the workflow report.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::provider::{ProductRecord, ProviderError};

use super::{ErrorKind, StageError};

/// Outcome of downloading one record.
#[derive(Debug)]
pub struct DownloadResult {
    record: ProductRecord,
    outcome: Result<PathBuf, StageError>,
}

impl DownloadResult {
    /// A successful download written to `path`.
    #[must_use]
    pub fn succeeded(record: ProductRecord, path: PathBuf) -> Self {
        Self {
            record,
            outcome: Ok(path),
        }
    }

    /// A failed download.
    #[must_use]
    pub fn failed(record: ProductRecord, error: StageError) -> Self {
        Self {
            record,
            outcome: Err(error),
        }
    }

    /// The record this result belongs to.
    #[must_use]
    pub fn record(&self) -> &ProductRecord {
        &self.record
    }

    /// Local artifact path, when the download succeeded.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.outcome.as_ref().ok().map(PathBuf::as_path)
    }

    /// The failure, when the download failed.
    #[must_use]
    pub fn error(&self) -> Option<&StageError> {
        self.outcome.as_ref().err()
    }

    /// Whether the artifact was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Consumes the result into its record and outcome.
    #[must_use]
    pub fn into_parts(self) -> (ProductRecord, Result<PathBuf, StageError>) {
        (self.record, self.outcome)
    }
}

/// A product type whose query failed after all attempts.
#[derive(Debug)]
pub struct QueryFailure {
    /// Product type that was queried.
    pub product_type: String,
    /// Last error returned.
    pub error: ProviderError,
}

impl QueryFailure {
    /// Flat classification of the failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from(&self.error)
    }
}

/// Everything a workflow run produced.
///
/// Download results keep the order of the records handed to the download
/// stage: per product type, in the order the product types were requested.
#[derive(Debug, Default)]
pub struct WorkflowReport {
    downloads: Vec<DownloadResult>,
    query_failures: Vec<QueryFailure>,
}

impl WorkflowReport {
    /// Creates a report from download results and query failures.
    #[must_use]
    pub fn new(downloads: Vec<DownloadResult>, query_failures: Vec<QueryFailure>) -> Self {
        Self {
            downloads,
            query_failures,
        }
    }

    /// A report for a download-only run.
    #[must_use]
    pub fn from_downloads(downloads: Vec<DownloadResult>) -> Self {
        Self::new(downloads, Vec::new())
    }

    /// Download results in record order.
    #[must_use]
    pub fn downloads(&self) -> &[DownloadResult] {
        &self.downloads
    }

    /// Consumes the report into its download results.
    #[must_use]
    pub fn into_results(self) -> Vec<DownloadResult> {
        self.downloads
    }

    /// Product types whose query failed.
    #[must_use]
    pub fn query_failures(&self) -> &[QueryFailure] {
        &self.query_failures
    }

    /// Number of artifacts written.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.downloads.iter().filter(|r| r.is_success()).count()
    }

    /// Number of records that failed, plus failed product-type queries.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.downloads.len() - self.completed() + self.query_failures.len()
    }

    /// True when every query and every download succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Identifiers of records whose download failed.
    pub fn failed_products(&self) -> impl Iterator<Item = &str> {
        self.downloads
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.record().identifier().unwrap_or_else(|| r.record().label()))
    }

    /// Multi-line, human-readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Downloaded {} of {} products",
            self.completed(),
            self.downloads.len()
        );
        if !self.query_failures.is_empty() {
            let _ = write!(
                out,
                " ({} product type queries failed)",
                self.query_failures.len()
            );
        }

        for failure in &self.query_failures {
            let _ = write!(
                out,
                "\n  [{}] query {}: {}",
                failure.kind(),
                failure.product_type,
                failure.error
            );
        }
        for result in &self.downloads {
            if let Some(error) = result.error() {
                let id = result
                    .record()
                    .identifier()
                    .unwrap_or_else(|| result.record().label());
                let _ = write!(out, "\n  [{}] {}: {}", error.kind(), id, error);
            }
        }
        out
    }
}
