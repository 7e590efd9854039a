//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable of a run. Values start from the
//! defaults below, are overlaid by an optional TOML [`FileConfig`], and are
//! finally overridden by command-line flags in the binary.
//!
//! ```toml
//! data_dir = "/srv/satdata"
//! workers = 4
//! query_attempts = 5
//! product_types_to_query = ["S2MSI2A", "landsat_ot_c2_l2"]
//!
//! [product_types]
//! OL_1_EFR___ = "copernicus"
//! ```

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::{
    DEFAULT_DOWNLOAD_ATTEMPTS, DEFAULT_QUERY_ATTEMPTS, DEFAULT_QUERY_RETRY_DELAY, DEFAULT_WORKERS,
    MAX_WORKERS, RetryPolicy,
};
use crate::provider::{DefaultProviderFactory, HttpSettings, ProviderEndpoints, ProviderKind};
use crate::routing::{DEFAULT_DATA_DIR, ProductRouter};

/// Product types queried when none are configured.
pub const DEFAULT_PRODUCT_TYPES: [&str; 2] = ["S2MSI1C", "landsat_8_c1"];

const MAX_ATTEMPTS: u32 = 10;
const MAX_RETRY_DELAY_SECS: u64 = 300;
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric setting is outside its allowed range.
    #[error("invalid config value for `{key}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Setting name.
        key: &'static str,
        /// Rejected value.
        value: String,
        /// Allowed range.
        expected: String,
    },

    /// No product types are configured to query.
    #[error("`product_types_to_query` must name at least one product type")]
    NoProductTypes,

    /// A configured product type is blank.
    #[error("`product_types_to_query` entry {index} is blank")]
    BlankProductType {
        /// Zero-based position of the blank entry.
        index: usize,
    },

    /// The TOML document could not be parsed.
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    /// Creates an out-of-range error.
    pub fn out_of_range(key: &'static str, value: impl Display, expected: impl Into<String>) -> Self {
        Self::OutOfRange {
            key,
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

/// Settings read from the TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Base directory for downloaded artifacts.
    pub data_dir: Option<PathBuf>,
    /// Concurrent downloads (1..=64).
    pub workers: Option<usize>,
    /// Query attempts per product type (1..=10).
    pub query_attempts: Option<u32>,
    /// Seconds between query attempts (0..=300).
    pub query_retry_delay_secs: Option<u64>,
    /// Download attempts per record (1..=10).
    pub download_attempts: Option<u32>,
    /// Seconds between download attempts (0..=300).
    pub download_retry_delay_secs: Option<u64>,
    /// HTTP connect timeout (1..=3600).
    pub connect_timeout_secs: Option<u64>,
    /// Longest pause between two reads of a response body (1..=3600).
    pub read_timeout_secs: Option<u64>,
    /// Deadline for a whole catalog API request (1..=3600). Artifact
    /// downloads are only bounded by `read_timeout_secs`.
    pub request_timeout_secs: Option<u64>,
    /// EarthExplorer M2M API root.
    pub earth_explorer_url: Option<String>,
    /// Copernicus Data Hub root.
    pub copernicus_url: Option<String>,
    /// Product types a `run` queries when none are given on the command line.
    pub product_types_to_query: Option<Vec<String>>,
    /// Extra product types and the provider serving each.
    #[serde(default)]
    pub product_types: BTreeMap<String, ProviderKind>,
}

impl FileConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML, unknown keys or
    /// unknown provider names.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}

/// Everything a pipeline run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Base directory for downloaded artifacts.
    pub data_dir: PathBuf,
    /// Concurrent downloads.
    pub workers: usize,
    /// Query attempts per product type.
    pub query_attempts: u32,
    /// Pause between query attempts.
    pub query_retry_delay: Duration,
    /// Download attempts per record.
    pub download_attempts: u32,
    /// Pause between download attempts.
    pub download_retry_delay: Duration,
    /// Product types queried by a workflow run.
    pub product_types_to_query: Vec<String>,
    /// Extra product-type mappings on top of each provider's built-in list.
    pub product_types: BTreeMap<String, ProviderKind>,
    /// HTTP timeouts.
    pub http: HttpSettings,
    /// Provider API roots.
    pub endpoints: ProviderEndpoints,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            workers: DEFAULT_WORKERS,
            query_attempts: DEFAULT_QUERY_ATTEMPTS,
            query_retry_delay: DEFAULT_QUERY_RETRY_DELAY,
            download_attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            download_retry_delay: DEFAULT_QUERY_RETRY_DELAY,
            product_types_to_query: DEFAULT_PRODUCT_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
            product_types: BTreeMap::new(),
            http: HttpSettings::default(),
            endpoints: ProviderEndpoints::default(),
        }
    }
}

impl PipelineConfig {
    /// Overlays every key set in `file`.
    pub fn apply_file(&mut self, file: &FileConfig) {
        if let Some(data_dir) = &file.data_dir {
            self.data_dir.clone_from(data_dir);
        }
        if let Some(workers) = file.workers {
            self.workers = workers;
        }
        if let Some(attempts) = file.query_attempts {
            self.query_attempts = attempts;
        }
        if let Some(secs) = file.query_retry_delay_secs {
            self.query_retry_delay = Duration::from_secs(secs);
        }
        if let Some(attempts) = file.download_attempts {
            self.download_attempts = attempts;
        }
        if let Some(secs) = file.download_retry_delay_secs {
            self.download_retry_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.http.connect_timeout_secs = secs;
        }
        if let Some(secs) = file.read_timeout_secs {
            self.http.read_timeout_secs = secs;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.http.request_timeout_secs = secs;
        }
        if let Some(url) = &file.earth_explorer_url {
            self.endpoints.earth_explorer.clone_from(url);
        }
        if let Some(url) = &file.copernicus_url {
            self.endpoints.copernicus.clone_from(url);
        }
        if let Some(product_types) = &file.product_types_to_query {
            self.product_types_to_query.clone_from(product_types);
        }
        self.product_types.extend(
            file.product_types
                .iter()
                .map(|(product_type, kind)| (product_type.clone(), *kind)),
        );
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("workers", self.workers, 1, MAX_WORKERS)?;
        check_range("query_attempts", self.query_attempts, 1, MAX_ATTEMPTS)?;
        check_range(
            "query_retry_delay_secs",
            self.query_retry_delay.as_secs(),
            0,
            MAX_RETRY_DELAY_SECS,
        )?;
        check_range("download_attempts", self.download_attempts, 1, MAX_ATTEMPTS)?;
        check_range(
            "download_retry_delay_secs",
            self.download_retry_delay.as_secs(),
            0,
            MAX_RETRY_DELAY_SECS,
        )?;
        check_range(
            "connect_timeout_secs",
            self.http.connect_timeout_secs,
            1,
            MAX_TIMEOUT_SECS,
        )?;
        check_range(
            "read_timeout_secs",
            self.http.read_timeout_secs,
            1,
            MAX_TIMEOUT_SECS,
        )?;
        check_range(
            "request_timeout_secs",
            self.http.request_timeout_secs,
            1,
            MAX_TIMEOUT_SECS,
        )?;
        if self.product_types_to_query.is_empty() {
            return Err(ConfigError::NoProductTypes);
        }
        if let Some(index) = self
            .product_types_to_query
            .iter()
            .position(|t| t.trim().is_empty())
        {
            return Err(ConfigError::BlankProductType { index });
        }
        Ok(())
    }

    /// Retry policy for product-type queries.
    #[must_use]
    pub fn query_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.query_attempts, self.query_retry_delay)
    }

    /// Retry policy for record downloads.
    #[must_use]
    pub fn download_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.download_attempts, self.download_retry_delay)
    }

    /// Router with the configured data directory and extra product types.
    #[must_use]
    pub fn router(&self) -> ProductRouter {
        self.product_types.iter().fold(
            ProductRouter::new(&self.data_dir),
            |router, (product_type, kind)| router.with_product_type(product_type.clone(), *kind),
        )
    }

    /// Factory building environment-authenticated clients for the configured
    /// endpoints.
    #[must_use]
    pub fn provider_factory(&self) -> DefaultProviderFactory {
        self.product_types.iter().fold(
            DefaultProviderFactory::new(self.endpoints.clone(), self.http),
            |factory, (product_type, kind)| factory.with_product_type(product_type.clone(), *kind),
        )
    }
}

fn check_range<T>(key: &'static str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + Display,
{
    if value < min || value > max {
        return Err(ConfigError::out_of_range(key, value, format!("{min}..={max}")));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("satdata"));
        assert_eq!(config.workers, 8);
        assert_eq!(config.query_attempts, 3);
        assert_eq!(config.query_retry_delay, Duration::from_secs(5));
        assert_eq!(config.download_attempts, 1);
        assert_eq!(config.product_types_to_query, vec!["S2MSI1C", "landsat_8_c1"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_file() {
        let file = FileConfig::from_toml_str(
            r#"
            data_dir = "/srv/satdata"
            workers = 4
            query_attempts = 5
            query_retry_delay_secs = 1
            download_attempts = 2
            download_retry_delay_secs = 0
            connect_timeout_secs = 10
            read_timeout_secs = 600
            request_timeout_secs = 120
            earth_explorer_url = "http://localhost:1/ee/"
            copernicus_url = "http://localhost:1/dhus"
            product_types_to_query = ["S2MSI2A"]

            [product_types]
            OL_1_EFR___ = "copernicus"
            "#,
        )
        .unwrap();

        let mut config = PipelineConfig::default();
        config.apply_file(&file);
        assert!(config.validate().is_ok());
        assert_eq!(config.data_dir, Path::new("/srv/satdata"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.query_retry_policy().max_attempts(), 5);
        assert_eq!(config.query_retry_policy().delay(), Duration::from_secs(1));
        assert_eq!(config.download_retry_policy().max_attempts(), 2);
        assert_eq!(config.http.read_timeout_secs, 600);
        assert_eq!(config.http.request_timeout_secs, 120);
        assert_eq!(config.endpoints.copernicus, "http://localhost:1/dhus");
        assert_eq!(config.product_types_to_query, vec!["S2MSI2A"]);
        assert_eq!(
            config.router().route_for_query("OL_1_EFR___").unwrap(),
            ProviderKind::Copernicus
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = FileConfig::from_toml_str("workers = 2").unwrap();
        let mut config = PipelineConfig::default();
        config.apply_file(&file);
        assert_eq!(config.workers, 2);
        assert_eq!(config.query_attempts, 3);
        assert_eq!(config.data_dir, PathBuf::from("satdata"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = FileConfig::from_toml_str("concurrency = 4");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = FileConfig::from_toml_str("[product_types]\nMOD09 = \"modis\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = PipelineConfig {
            workers: 0,
            ..PipelineConfig::default()
        };
        let error = config.validate().unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid config value for `workers`: 0. Expected range: 1..=64"
        );

        let config = PipelineConfig {
            query_attempts: 11,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                key: "query_attempts",
                ..
            })
        ));

        let config = PipelineConfig {
            query_retry_delay: Duration::from_secs(301),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_product_types() {
        let config = PipelineConfig {
            product_types_to_query: Vec::new(),
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoProductTypes)));
    }

    #[test]
    fn test_validate_rejects_any_blank_product_type() {
        let config = PipelineConfig {
            product_types_to_query: vec!["S2MSI1C".to_string(), "  ".to_string()],
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::BlankProductType { index: 1 }), "{err}");
        assert!(err.to_string().contains("entry 1"));
    }

    #[test]
    fn test_validate_rejects_zero_request_timeout() {
        let mut config = PipelineConfig::default();
        config.http.request_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"), "{err}");
    }
}
