//! Routing of product types and product records to providers.
//!
//! [`ProductRouter`] answers two questions:
//!
//! - which provider serves a product type ([`ProductRouter::route_for_query`])
//! - which provider owns a record and where its artifact goes
//!   ([`ProductRouter::route_for_download`])
//!
//! Record routing uses the record's provider tag when present and otherwise
//! the discriminator field names each [`ProviderKind`] declares.

mod error;

pub use error::RoutingError;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::provider::{ProductRecord, ProviderError, ProviderKind};

/// Default base directory for downloaded artifacts.
pub const DEFAULT_DATA_DIR: &str = "satdata";

/// Where a record is downloaded and by whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Provider owning the record.
    pub kind: ProviderKind,
    /// Directory receiving the artifact.
    pub output_dir: PathBuf,
}

/// Maps product types and records to providers and output directories.
#[derive(Debug, Clone)]
pub struct ProductRouter {
    data_dir: PathBuf,
    product_types: BTreeMap<String, ProviderKind>,
    output_dirs: BTreeMap<ProviderKind, PathBuf>,
}

impl Default for ProductRouter {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

impl ProductRouter {
    /// Creates a router seeded with every provider's built-in product types,
    /// writing artifacts to `<data_dir>/<provider subdir>`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let product_types = ProviderKind::ALL
            .into_iter()
            .flat_map(|kind| {
                kind.default_product_types()
                    .iter()
                    .map(move |product_type| ((*product_type).to_string(), kind))
            })
            .collect();
        Self {
            data_dir: data_dir.into(),
            product_types,
            output_dirs: BTreeMap::new(),
        }
    }

    /// Maps an additional product type to `kind`, replacing any existing mapping.
    #[must_use]
    pub fn with_product_type(mut self, product_type: impl Into<String>, kind: ProviderKind) -> Self {
        self.product_types.insert(product_type.into(), kind);
        self
    }

    /// Overrides the output directory of one provider.
    #[must_use]
    pub fn with_output_dir(mut self, kind: ProviderKind, dir: impl Into<PathBuf>) -> Self {
        self.output_dirs.insert(kind, dir.into());
        self
    }

    /// Base data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Output directory for `kind`.
    #[must_use]
    pub fn output_dir(&self, kind: ProviderKind) -> PathBuf {
        self.output_dirs
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.data_dir.join(kind.default_subdir()))
    }

    /// Product types served by `kind`, in name order.
    pub fn product_types_for(&self, kind: ProviderKind) -> impl Iterator<Item = &str> {
        self.product_types
            .iter()
            .filter(move |(_, owner)| **owner == kind)
            .map(|(product_type, _)| product_type.as_str())
    }

    /// Resolves the provider serving `product_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnsupportedProductType`] for an unmapped type.
    pub fn route_for_query(&self, product_type: &str) -> Result<ProviderKind, ProviderError> {
        self.product_types
            .get(product_type)
            .copied()
            .ok_or_else(|| ProviderError::unsupported_product_type(product_type))
    }

    /// Resolves the provider owning `record` and its output directory.
    ///
    /// # Errors
    ///
    /// - [`RoutingError::Conflict`] when a tagged record carries another
    ///   provider's discriminator
    /// - [`RoutingError::NoMatch`] when an untagged record carries no known
    ///   discriminator
    /// - [`RoutingError::Ambiguous`] when an untagged record carries several
    pub fn route_for_download(&self, record: &ProductRecord) -> Result<Route, RoutingError> {
        let kind = match record.provider() {
            Some(tagged) => {
                if let Some((other, field)) = foreign_discriminator(record, tagged) {
                    return Err(RoutingError::conflict(record.label(), tagged, other, field));
                }
                tagged
            }
            None => {
                let matches: Vec<ProviderKind> = ProviderKind::ALL
                    .into_iter()
                    .filter(|kind| {
                        kind.discriminator_keys()
                            .iter()
                            .any(|key| record.has_field(key))
                    })
                    .collect();
                match matches.len() {
                    0 => return Err(RoutingError::no_match(record.label(), record.field_names())),
                    1 => matches[0],
                    _ => return Err(RoutingError::ambiguous(record.label(), matches)),
                }
            }
        };

        let output_dir = self.output_dir(kind);
        debug!(product = %record, provider = %kind, dir = %output_dir.display(), "routed record");
        Ok(Route { kind, output_dir })
    }
}

fn foreign_discriminator(
    record: &ProductRecord,
    tagged: ProviderKind,
) -> Option<(ProviderKind, &'static str)> {
    ProviderKind::ALL
        .into_iter()
        .filter(|kind| *kind != tagged)
        .find_map(|kind| {
            kind.discriminator_keys()
                .iter()
                .find(|key| record.has_field(key))
                .map(|key| (kind, *key))
        })
}
