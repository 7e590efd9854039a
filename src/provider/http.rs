//! Shared HTTP client construction and artifact streaming for providers.
//!
//! Both provider clients build their `reqwest` client here so timeouts,
//! user-agent and compression stay consistent, and stream artifacts to disk
//! through [`stream_to_file`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_DISPOSITION;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use url::Url;

use crate::user_agent;

use super::filename::artifact_filename;
use super::{ProviderError, ProviderKind};

/// Default connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout between two reads of a response body (2 minutes).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;

/// Default deadline for a whole catalog API request (5 minutes).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Timeout settings applied to every provider HTTP client.
///
/// Artifact downloads have no total deadline: a multi-gigabyte archive may
/// stream for as long as data keeps arriving within `read_timeout_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Longest pause between two reads, in seconds.
    pub read_timeout_secs: u64,
    /// Deadline for a whole search or session request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl HttpSettings {
    /// Deadline applied per request to catalog API calls.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builds a provider HTTP client using the shared project policy.
///
/// # Errors
///
/// Returns [`ProviderError::Configuration`] when client construction fails.
pub(crate) fn build_http_client(
    kind: ProviderKind,
    settings: &HttpSettings,
) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .read_timeout(Duration::from_secs(settings.read_timeout_secs))
        .user_agent(user_agent::default_user_agent())
        .gzip(true)
        .build()
        .map_err(|e| {
            ProviderError::configuration(kind, format!("HTTP client construction failed: {e}"))
        })
}

/// Parses a provider base URL, ensuring a trailing slash so relative
/// endpoint paths join underneath it.
///
/// # Errors
///
/// Returns [`ProviderError::Configuration`] for an unparsable URL.
pub(crate) fn parse_base_url(kind: ProviderKind, raw: &str) -> Result<Url, ProviderError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash)
        .map_err(|e| ProviderError::configuration(kind, format!("invalid base URL '{raw}': {e}")))
}

/// Joins an endpoint path onto a base URL produced by [`parse_base_url`].
pub(crate) fn endpoint(
    kind: ProviderKind,
    base: &Url,
    path: &str,
) -> Result<Url, ProviderError> {
    base.join(path).map_err(|e| {
        ProviderError::configuration(kind, format!("invalid endpoint path '{path}': {e}"))
    })
}

/// Describes a transport-level `reqwest` failure for error messages.
pub(crate) fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}

/// Streams a successful artifact response into `output_dir`.
///
/// The file name comes from the response's Content-Disposition header, else
/// `product_stem` + `default_extension`. A partially written file is removed
/// when the stream fails.
///
/// # Errors
///
/// Returns [`ProviderError::Io`] for disk failures and
/// [`ProviderError::Download`] when the body stream breaks.
pub(crate) async fn stream_to_file(
    kind: ProviderKind,
    response: reqwest::Response,
    output_dir: &Path,
    product_stem: &str,
    default_extension: &str,
) -> Result<PathBuf, ProviderError> {
    let content_disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let filename = artifact_filename(
        content_disposition.as_deref(),
        product_stem,
        default_extension,
    );
    let file_path = output_dir.join(&filename);
    debug!(path = %file_path.display(), "resolved artifact path");

    let file = File::create(&file_path)
        .await
        .map_err(|e| ProviderError::io(file_path.clone(), e))?;

    let result = write_body(kind, product_stem, file, response, &file_path).await;
    match result {
        Ok(bytes) => {
            info!(provider = %kind, path = %file_path.display(), bytes, "artifact written");
            Ok(file_path)
        }
        Err(error) => {
            debug!(path = %file_path.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(&file_path).await;
            Err(error)
        }
    }
}

async fn write_body(
    kind: ProviderKind,
    product: &str,
    file: File,
    response: reqwest::Response,
    file_path: &Path,
) -> Result<u64, ProviderError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            ProviderError::download(kind, product, describe_transport_error(&e))
        })?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ProviderError::io(file_path.to_path_buf(), e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| ProviderError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_http_settings() {
        let settings = HttpSettings::default();
        assert_eq!(settings.connect_timeout_secs, 30);
        assert_eq!(settings.read_timeout_secs, 120);
        assert_eq!(settings.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_base_url_adds_trailing_slash() {
        let base = parse_base_url(ProviderKind::Copernicus, "https://scihub.copernicus.eu/dhus")
            .unwrap();
        assert_eq!(base.as_str(), "https://scihub.copernicus.eu/dhus/");
        let search = endpoint(ProviderKind::Copernicus, &base, "search").unwrap();
        assert_eq!(search.as_str(), "https://scihub.copernicus.eu/dhus/search");
    }

    #[test]
    fn test_parse_base_url_rejects_garbage() {
        let result = parse_base_url(ProviderKind::EarthExplorer, "not a url");
        assert!(matches!(result, Err(ProviderError::Configuration { .. })));
    }

    #[test]
    fn test_build_http_client_succeeds_with_defaults() {
        let client = build_http_client(ProviderKind::Copernicus, &HttpSettings::default());
        assert!(client.is_ok());
    }
}
