//! Provider clients for satellite imagery catalogs.
//!
//! This module defines the [`ProviderClient`] contract every imagery backend
//! implements, the [`ProviderKind`] tag identifying each backend, and the
//! [`ProviderFactory`] used by the pipeline stages to open a fresh client per
//! call.
//!
//! # Architecture
//!
//! - [`ProviderClient`] - Async trait with `query` and `download`
//! - [`EarthExplorerClient`] - USGS EarthExplorer machine-to-machine API (Landsat)
//! - [`CopernicusClient`] - Copernicus Data Hub OpenSearch/OData API (Sentinel)
//! - [`ProductRecord`] - Provider-tagged catalog entry returned by queries
//! - [`SearchCriteria`] - Validated product type, bounding box and date range
//!
//! # Example
//!
//! ```no_run
//! use satflow::provider::{
//!     BoundingBox, DefaultProviderFactory, ProviderFactory, ProviderKind, SearchCriteria,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = DefaultProviderFactory::default();
//! let client = factory.create(ProviderKind::Copernicus)?;
//! let bbox = BoundingBox::new(23.5, 37.7, 24.0, 38.2)?;
//! let criteria = SearchCriteria::parse("S2MSI1C", bbox, "20210112", "20210114")?;
//! let records = client.query(&criteria).await?;
//! println!("found {} products", records.len());
//! # Ok(())
//! # }
//! ```

mod copernicus;
mod credentials;
mod criteria;
mod earth_explorer;
mod error;
mod filename;
mod http;
mod record;

pub use copernicus::{CopernicusClient, DEFAULT_COPERNICUS_URL};
pub use credentials::Credentials;
pub use criteria::{BoundingBox, CriteriaError, Point, SearchCriteria, parse_date};
pub use earth_explorer::{DEFAULT_EARTH_EXPLORER_URL, EarthExplorerClient};
pub use error::ProviderError;
pub use http::HttpSettings;
pub use record::ProductRecord;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies one provider backend.
///
/// Each variant declares the discriminator field names its records are
/// guaranteed to carry, the product types it serves by default, and the
/// environment variables holding its credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// USGS EarthExplorer (Landsat products).
    EarthExplorer,
    /// Copernicus Data Hub (Sentinel products).
    Copernicus,
}

impl ProviderKind {
    /// Every known provider, in routing-table order.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::EarthExplorer, ProviderKind::Copernicus];

    /// Stable lowercase name, also used in config files and serialized records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EarthExplorer => "earth_explorer",
            Self::Copernicus => "copernicus",
        }
    }

    /// Field names this provider guarantees on every record it produces.
    #[must_use]
    pub fn discriminator_keys(self) -> &'static [&'static str] {
        match self {
            Self::EarthExplorer => &["entity_id"],
            Self::Copernicus => &["uuid"],
        }
    }

    /// Product types served by this provider out of the box.
    #[must_use]
    pub fn default_product_types(self) -> &'static [&'static str] {
        match self {
            Self::EarthExplorer => &[
                "landsat_8_c1",
                "landsat_ot_c2_l1",
                "landsat_ot_c2_l2",
                "landsat_etm_c2_l1",
                "landsat_tm_c2_l1",
            ],
            Self::Copernicus => &["S2MSI1C", "S2MSI2A", "S2MS2Ap", "GRD", "SLC", "OCN"],
        }
    }

    /// Subdirectory of the data directory holding this provider's downloads.
    #[must_use]
    pub fn default_subdir(self) -> &'static str {
        match self {
            Self::EarthExplorer => "landsat",
            Self::Copernicus => "sentinel",
        }
    }

    /// Environment variables holding the `(username, password)` pair.
    #[must_use]
    pub fn credential_vars(self) -> (&'static str, &'static str) {
        match self {
            Self::EarthExplorer => ("LANDSATXPLORE_USERNAME", "LANDSATXPLORE_PASSWORD"),
            Self::Copernicus => ("DHUS_USER", "DHUS_PASSWORD"),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| {
                format!("unknown provider '{s}' (expected earth_explorer or copernicus)")
            })
    }
}

/// Contract every imagery backend implements.
///
/// Each call opens its own authenticated session and releases it before
/// returning, on success and on failure alike. Clients hold no session state
/// between calls.
///
/// # Object Safety
///
/// Uses `async_trait` so stages can hold `Box<dyn ProviderClient>`.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Which backend this client talks to.
    fn kind(&self) -> ProviderKind;

    /// Searches the catalog, returning records in the provider's native order.
    ///
    /// # Errors
    ///
    /// [`ProviderError::UnsupportedProductType`] when this provider does not
    /// serve the product type, [`ProviderError::Authentication`] when the
    /// session can not be established, [`ProviderError::Query`] for any other
    /// remote failure.
    async fn query(&self, criteria: &SearchCriteria) -> Result<Vec<ProductRecord>, ProviderError>;

    /// Downloads the artifact for `record` into `output_dir`, returning its path.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Authentication`], [`ProviderError::NotFound`] when the
    /// product is gone, [`ProviderError::Download`] or [`ProviderError::Io`]
    /// for remote or disk failures.
    async fn download(
        &self,
        record: &ProductRecord,
        output_dir: &Path,
    ) -> Result<PathBuf, ProviderError>;
}

/// Builds provider clients on demand.
///
/// Stages call [`ProviderFactory::create`] for every query attempt and every
/// download, so no client instance is shared between calls.
pub trait ProviderFactory: Send + Sync {
    /// Creates a fresh client for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] when credentials or settings
    /// for the provider are missing.
    fn create(&self, kind: ProviderKind) -> Result<Box<dyn ProviderClient>, ProviderError>;
}

/// Base URLs of the provider APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    /// USGS M2M JSON API root (trailing slash included).
    pub earth_explorer: String,
    /// Copernicus Data Hub root.
    pub copernicus: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            earth_explorer: DEFAULT_EARTH_EXPLORER_URL.to_string(),
            copernicus: DEFAULT_COPERNICUS_URL.to_string(),
        }
    }
}

/// Factory that reads credentials from the environment on every `create`.
#[derive(Debug, Clone, Default)]
pub struct DefaultProviderFactory {
    endpoints: ProviderEndpoints,
    http: HttpSettings,
    extra_product_types: BTreeMap<ProviderKind, Vec<String>>,
}

impl DefaultProviderFactory {
    /// Creates a factory for the given endpoints and HTTP settings.
    #[must_use]
    pub fn new(endpoints: ProviderEndpoints, http: HttpSettings) -> Self {
        Self {
            endpoints,
            http,
            extra_product_types: BTreeMap::new(),
        }
    }

    /// Lets clients of `kind` accept `product_type` in addition to their
    /// built-in list.
    #[must_use]
    pub fn with_product_type(mut self, product_type: impl Into<String>, kind: ProviderKind) -> Self {
        self.extra_product_types
            .entry(kind)
            .or_default()
            .push(product_type.into());
        self
    }

    fn extras(&self, kind: ProviderKind) -> Vec<String> {
        self.extra_product_types
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn create(&self, kind: ProviderKind) -> Result<Box<dyn ProviderClient>, ProviderError> {
        match kind {
            ProviderKind::EarthExplorer => Ok(Box::new(
                EarthExplorerClient::from_env(&self.endpoints.earth_explorer, &self.http)?
                    .with_product_types(self.extras(kind)),
            )),
            ProviderKind::Copernicus => Ok(Box::new(
                CopernicusClient::from_env(&self.endpoints.copernicus, &self.http)?
                    .with_product_types(self.extras(kind)),
            )),
        }
    }
}
