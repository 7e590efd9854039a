//! Query-then-download workflow.

use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::future::join_all;
use tracing::{info, instrument, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::provider::{BoundingBox, CriteriaError, ProviderFactory, SearchCriteria};

use super::download::DownloadStage;
use super::query::QueryStage;
use super::report::{QueryFailure, WorkflowReport};

/// Runs one query per product type, then downloads everything found.
#[derive(Debug)]
pub struct Orchestrator {
    query_stage: QueryStage,
    download_stage: DownloadStage,
    product_types: Vec<String>,
}

impl Orchestrator {
    /// Builds both stages from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] raised by [`PipelineConfig::validate`].
    pub fn new(
        config: &PipelineConfig,
        factory: Arc<dyn ProviderFactory>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let router = Arc::new(config.router());
        Ok(Self {
            query_stage: QueryStage::new(
                Arc::clone(&factory),
                Arc::clone(&router),
                config.query_retry_policy(),
            ),
            download_stage: DownloadStage::new(
                factory,
                router,
                config.workers,
                config.download_retry_policy(),
            )?,
            product_types: config.product_types_to_query.clone(),
        })
    }

    /// The query stage.
    #[must_use]
    pub fn query_stage(&self) -> &QueryStage {
        &self.query_stage
    }

    /// The download stage.
    #[must_use]
    pub fn download_stage(&self) -> &DownloadStage {
        &self.download_stage
    }

    /// Product types queried by [`Orchestrator::run`].
    #[must_use]
    pub fn product_types(&self) -> &[String] {
        &self.product_types
    }

    /// Runs the workflow for the configured product types.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::run_workflow`].
    pub async fn run(
        &self,
        bbox: BoundingBox,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<WorkflowReport, CriteriaError> {
        self.run_workflow(bbox, start_date, end_date, &self.product_types)
            .await
    }

    /// Queries every product type concurrently, concatenates the records in
    /// product-type order and downloads them all.
    ///
    /// A failed query leaves its product type out of the downloads and is
    /// recorded in the report; sibling product types still proceed.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError`] when a product type is blank or the dates
    /// are inverted. No query is issued in that case.
    #[instrument(skip(self, bbox, product_types), fields(%bbox, %start_date, %end_date, product_types = product_types.len()))]
    pub async fn run_workflow(
        &self,
        bbox: BoundingBox,
        start_date: NaiveDate,
        end_date: NaiveDate,
        product_types: &[String],
    ) -> Result<WorkflowReport, CriteriaError> {
        let criteria = product_types
            .iter()
            .map(|product_type| SearchCriteria::new(product_type.as_str(), bbox, start_date, end_date))
            .collect::<Result<Vec<_>, _>>()?;

        let outcomes = join_all(criteria.iter().map(|c| self.query_stage.run_query(c))).await;

        let mut records = Vec::new();
        let mut query_failures = Vec::new();
        for (criteria, outcome) in criteria.iter().zip(outcomes) {
            match outcome {
                Ok(found) => records.extend(found),
                Err(error) => {
                    warn!(product_type = criteria.product_type(), error = %error, "skipping product type");
                    query_failures.push(QueryFailure {
                        product_type: criteria.product_type().to_string(),
                        error,
                    });
                }
            }
        }

        info!(records = records.len(), "queries complete, starting downloads");
        let downloads = self.download_stage.run_downloads(records).await;
        Ok(WorkflowReport::new(downloads, query_failures))
    }
}
