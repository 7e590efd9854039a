//! Error types for provider operations.
//!
//! Every failure a provider client can report maps to one variant here, with
//! enough context (provider, product, URL, path) to act on the message alone.

use std::path::PathBuf;

use thiserror::Error;

use super::ProviderKind;

/// Errors that can occur while querying or downloading from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Required credentials or client settings are missing or invalid.
    ///
    /// Raised before any network call is made.
    #[error("{provider} is not configured: {reason}\n  Suggestion: {suggestion}")]
    Configuration {
        /// Provider whose configuration is incomplete.
        provider: ProviderKind,
        /// What is missing or invalid.
        reason: String,
        /// How to fix the configuration.
        suggestion: String,
    },

    /// No provider serves the requested product type.
    #[error("product type '{product_type}' is not supported{}", served_by_suffix(.provider))]
    UnsupportedProductType {
        /// The product type that was requested.
        product_type: String,
        /// Provider that rejected it, when the check happened inside a client.
        provider: Option<ProviderKind>,
    },

    /// Establishing an authenticated session with the provider failed.
    #[error("[AUTH] {provider} authentication failed: {reason}")]
    Authentication {
        /// Provider that rejected the session.
        provider: ProviderKind,
        /// Why authentication failed (HTTP status, API error code, transport error).
        reason: String,
    },

    /// The remote catalog query failed.
    #[error("{provider} query for '{product_type}' failed: {reason}")]
    Query {
        /// Provider that was queried.
        provider: ProviderKind,
        /// Product type being searched.
        product_type: String,
        /// Remote failure detail.
        reason: String,
    },

    /// Fetching or writing the product artifact failed.
    #[error("{provider} download of '{product}' failed: {reason}")]
    Download {
        /// Provider serving the product.
        provider: ProviderKind,
        /// Product identifier or title.
        product: String,
        /// Remote or local failure detail.
        reason: String,
    },

    /// File system error while writing the artifact.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The product is no longer resolvable at the remote.
    #[error("{provider} product '{product}' was not found")]
    NotFound {
        /// Provider that was asked for the product.
        provider: ProviderKind,
        /// Product identifier or title.
        product: String,
    },
}

fn served_by_suffix(provider: &Option<ProviderKind>) -> String {
    provider
        .map(|p| format!(" by {p}"))
        .unwrap_or_default()
}

impl ProviderError {
    /// Creates a configuration error for a missing environment variable.
    pub fn missing_credential(provider: ProviderKind, variable: &str) -> Self {
        Self::Configuration {
            provider,
            reason: format!("environment variable {variable} is not set"),
            suggestion: format!("Export {variable} or add it to a .env file"),
        }
    }

    /// Creates a generic configuration error.
    pub fn configuration(provider: ProviderKind, reason: impl Into<String>) -> Self {
        Self::Configuration {
            provider,
            reason: reason.into(),
            suggestion: "Check the provider settings in the satflow config file".to_string(),
        }
    }

    /// Creates an unsupported product type error raised by routing.
    pub fn unsupported_product_type(product_type: impl Into<String>) -> Self {
        Self::UnsupportedProductType {
            product_type: product_type.into(),
            provider: None,
        }
    }

    /// Creates an unsupported product type error raised by a specific provider.
    pub fn unsupported_by(provider: ProviderKind, product_type: impl Into<String>) -> Self {
        Self::UnsupportedProductType {
            product_type: product_type.into(),
            provider: Some(provider),
        }
    }

    /// Creates an authentication error.
    pub fn authentication(provider: ProviderKind, reason: impl Into<String>) -> Self {
        Self::Authentication {
            provider,
            reason: reason.into(),
        }
    }

    /// Creates a query error.
    pub fn query(
        provider: ProviderKind,
        product_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Query {
            provider,
            product_type: product_type.into(),
            reason: reason.into(),
        }
    }

    /// Creates a download error.
    pub fn download(
        provider: ProviderKind,
        product: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Download {
            provider,
            product: product.into(),
            reason: reason.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(provider: ProviderKind, product: impl Into<String>) -> Self {
        Self::NotFound {
            provider,
            product: product.into(),
        }
    }
}

// No From<reqwest::Error> or From<std::io::Error>: every variant needs context
// (provider, product, path) the source error does not carry.
