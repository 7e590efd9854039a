//! Query and download stages and the orchestrator composing them.
//!
//! # Overview
//!
//! - [`QueryStage`] routes a product type to its provider and runs a retrying query
//! - [`DownloadStage`] routes every record and downloads with bounded parallelism
//! - [`Orchestrator`] fans product-type queries out, then downloads the union
//!
//! Per-record failures never abort a batch: each one lands in its
//! [`DownloadResult`] as a [`StageError`].

mod download;
mod orchestrator;
mod query;
mod report;
mod retry;

pub use download::{DEFAULT_WORKERS, DownloadStage, MAX_WORKERS};
pub use orchestrator::Orchestrator;
pub use query::QueryStage;
pub use report::{DownloadResult, QueryFailure, WorkflowReport};
pub use retry::{
    DEFAULT_DOWNLOAD_ATTEMPTS, DEFAULT_QUERY_ATTEMPTS, DEFAULT_QUERY_RETRY_DELAY, FailureType,
    RetryDecision, RetryPolicy, classify_download_error, classify_error,
};

use std::fmt;

use thiserror::Error;

use crate::provider::ProviderError;
use crate::routing::RoutingError;

/// Flat, copyable classification of a failure for reports and exit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing credentials or invalid settings.
    Configuration,
    /// No provider serves the product type.
    UnsupportedProductType,
    /// Session could not be established.
    Authentication,
    /// Remote catalog query failed.
    Query,
    /// Remote fetch or local write failed.
    Download,
    /// Product no longer exists remotely.
    NotFound,
    /// Record could not be assigned to a provider.
    Routing,
    /// The worker task died before producing a result.
    Aborted,
}

impl ErrorKind {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::UnsupportedProductType => "unsupported_product_type",
            Self::Authentication => "authentication",
            Self::Query => "query",
            Self::Download => "download",
            Self::NotFound => "not_found",
            Self::Routing => "routing",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ProviderError> for ErrorKind {
    fn from(error: &ProviderError) -> Self {
        match error {
            ProviderError::Configuration { .. } => Self::Configuration,
            ProviderError::UnsupportedProductType { .. } => Self::UnsupportedProductType,
            ProviderError::Authentication { .. } => Self::Authentication,
            ProviderError::Query { .. } => Self::Query,
            ProviderError::Download { .. } | ProviderError::Io { .. } => Self::Download,
            ProviderError::NotFound { .. } => Self::NotFound,
        }
    }
}

/// Failure of one record inside a stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The record could not be routed.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// The worker task panicked or was cancelled.
    #[error("download task for '{product}' aborted: {reason}")]
    TaskAborted {
        /// Record label.
        product: String,
        /// Join failure detail.
        reason: String,
    },
}

impl StageError {
    /// Creates a task-aborted error.
    pub fn task_aborted(product: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TaskAborted {
            product: product.into(),
            reason: reason.into(),
        }
    }

    /// Flat classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(error) => ErrorKind::from(error),
            Self::Routing(_) => ErrorKind::Routing,
            Self::TaskAborted { .. } => ErrorKind::Aborted,
        }
    }
}
