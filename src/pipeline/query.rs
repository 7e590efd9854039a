//! Retrying product-type query stage.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::provider::{ProductRecord, ProviderError, ProviderFactory, SearchCriteria};
use crate::routing::ProductRouter;

use super::retry::{RetryPolicy, classify_error, retry_with_policy};

/// Runs one product-type query against the provider that serves it.
///
/// Every attempt builds a fresh client through the factory, so no session or
/// connection state survives a failed attempt.
pub struct QueryStage {
    factory: Arc<dyn ProviderFactory>,
    router: Arc<ProductRouter>,
    retry_policy: RetryPolicy,
}

impl QueryStage {
    /// Creates a query stage.
    #[must_use]
    pub fn new(
        factory: Arc<dyn ProviderFactory>,
        router: Arc<ProductRouter>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            factory,
            router,
            retry_policy,
        }
    }

    /// Configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Queries the provider serving `criteria.product_type()`.
    ///
    /// Remote query and authentication failures are retried per the policy;
    /// configuration and unsupported-type failures return immediately.
    ///
    /// # Errors
    ///
    /// Returns the last [`ProviderError`] once retries are exhausted, or the
    /// first non-retryable one.
    #[instrument(skip(self, criteria), fields(product_type = criteria.product_type()))]
    pub async fn run_query(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<Vec<ProductRecord>, ProviderError> {
        let kind = self.router.route_for_query(criteria.product_type())?;
        let factory = &self.factory;

        let result = retry_with_policy(
            &self.retry_policy,
            "query",
            classify_error,
            |_attempt| async move {
                let client = factory.create(kind)?;
                client.query(criteria).await
            },
        )
        .await;

        match result {
            Ok(records) => {
                info!(
                    provider = %kind,
                    count = records.len(),
                    "query returned {} records",
                    records.len()
                );
                Ok(records)
            }
            Err((error, attempts)) => {
                warn!(provider = %kind, attempts, error = %error, "query failed");
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for QueryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStage")
            .field("router", &self.router)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}
