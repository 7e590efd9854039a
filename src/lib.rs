//! satflow core library
//!
//! Discovers and downloads satellite imagery products from several catalog
//! providers through one workflow: give it a bounding box and a date range,
//! and it queries each configured product type at the provider serving it,
//! then downloads every match into a provider-specific directory.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`provider`] - Provider contract and the EarthExplorer / Copernicus clients
//! - [`routing`] - Product-type and record routing to providers
//! - [`pipeline`] - Query and download stages, retry, and the orchestrator
//! - [`config`] - Pipeline configuration and the TOML config file

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod pipeline;
pub mod provider;
pub mod routing;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig, PipelineConfig};
pub use pipeline::{
    DownloadResult, DownloadStage, ErrorKind, Orchestrator, QueryStage, RetryPolicy, StageError,
    WorkflowReport,
};
pub use provider::{
    BoundingBox, DefaultProviderFactory, ProductRecord, ProviderClient, ProviderError,
    ProviderFactory, ProviderKind, SearchCriteria,
};
pub use routing::{ProductRouter, Route, RoutingError};
