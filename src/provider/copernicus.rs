//! Copernicus Data Hub client for Sentinel products.
//!
//! Queries go through the DHuS OpenSearch endpoint (`/search`) and downloads
//! through OData (`/odata/v1/Products('<uuid>')/$value`), both with HTTP basic
//! authentication.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::http::{
    HttpSettings, build_http_client, describe_transport_error, endpoint, parse_base_url,
    stream_to_file,
};
use super::{
    Credentials, ProductRecord, ProviderClient, ProviderError, ProviderKind, SearchCriteria,
};

/// Default Copernicus Data Hub root.
pub const DEFAULT_COPERNICUS_URL: &str = "https://scihub.copernicus.eu/dhus";

/// Results requested per OpenSearch page (the hub's maximum).
const PAGE_SIZE: usize = 100;

/// Extension for Sentinel SAFE archives when the server does not name the file.
const ARTIFACT_EXTENSION: &str = ".zip";

/// Entry sections whose `{name, content}` items are flattened into record attributes.
const TYPED_SECTIONS: [&str; 5] = ["str", "date", "int", "double", "bool"];

const KIND: ProviderKind = ProviderKind::Copernicus;

/// Client for the Copernicus Data Hub.
pub struct CopernicusClient {
    credentials: Credentials,
    base_url: Url,
    http: HttpSettings,
    product_types: Vec<String>,
}

impl CopernicusClient {
    /// Creates a client for the hub at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] for an invalid base URL.
    pub fn new(
        credentials: Credentials,
        base_url: &str,
        http: &HttpSettings,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            credentials,
            base_url: parse_base_url(KIND, base_url)?,
            http: *http,
            product_types: KIND
                .default_product_types()
                .iter()
                .map(ToString::to_string)
                .collect(),
        })
    }

    /// Creates a client using `DHUS_USER`/`DHUS_PASSWORD` from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] when a variable is missing or
    /// the base URL is invalid.
    pub fn from_env(base_url: &str, http: &HttpSettings) -> Result<Self, ProviderError> {
        Self::new(Credentials::from_env(KIND)?, base_url, http)
    }

    /// Adds product types this client accepts beyond the built-in list.
    #[must_use]
    pub fn with_product_types<I, S>(mut self, product_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for product_type in product_types {
            let product_type = product_type.into();
            if !self.product_types.contains(&product_type) {
                self.product_types.push(product_type);
            }
        }
        self
    }

    fn open_session(&self) -> Result<HubSession<'_>, ProviderError> {
        let client = build_http_client(KIND, &self.http)?;
        debug!(provider = %KIND, "session opened");
        Ok(HubSession {
            client,
            credentials: &self.credentials,
        })
    }

    fn search_url(&self, query: &str, start: usize) -> Result<Url, ProviderError> {
        let mut url = endpoint(KIND, &self.base_url, "search")?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("rows", &PAGE_SIZE.to_string())
            .append_pair("start", &start.to_string())
            .append_pair("q", query);
        Ok(url)
    }

    async fn search(
        &self,
        session: &HubSession<'_>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<ProductRecord>, ProviderError> {
        let product_type = criteria.product_type();
        let query = build_search_query(criteria);
        debug!(%query, "copernicus search query");

        let mut records = Vec::new();
        let mut start = 0usize;
        loop {
            let url = self.search_url(&query, start)?;
            let response = session
                .get(url)
                .timeout(self.http.request_timeout())
                .send()
                .await
                .map_err(|e| ProviderError::query(KIND, product_type, describe_transport_error(&e)))?;

            let status = response.status();
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                return Err(ProviderError::authentication(
                    KIND,
                    format!("search returned HTTP {}", status.as_u16()),
                ));
            }
            if !status.is_success() {
                return Err(ProviderError::query(
                    KIND,
                    product_type,
                    format!("search returned HTTP {}", status.as_u16()),
                ));
            }

            let page: SearchResponse = response.json().await.map_err(|e| {
                ProviderError::query(KIND, product_type, format!("malformed search response: {e}"))
            })?;
            let total = page.feed.total_results();
            let entries = page.feed.entries();
            let page_len = entries.len();

            records.extend(entries.iter().filter_map(|entry| {
                let record = entry_to_record(entry);
                if record.is_none() {
                    warn!(provider = %KIND, "skipping search entry without id");
                }
                record
            }));

            start += page_len;
            let exhausted = match total {
                Some(total) => start >= total,
                None => page_len < PAGE_SIZE,
            };
            if page_len == 0 || exhausted {
                break;
            }
        }
        Ok(records)
    }

    async fn fetch(
        &self,
        session: &HubSession<'_>,
        record: &ProductRecord,
        output_dir: &Path,
    ) -> Result<PathBuf, ProviderError> {
        let uuid = record.field_str("uuid").ok_or_else(|| {
            ProviderError::download(KIND, record.label(), "record carries no uuid field")
        })?;
        let title = record.field_str("title").unwrap_or(uuid);
        let url = endpoint(KIND, &self.base_url, &product_value_path(uuid))?;

        let response = session
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::download(KIND, title, describe_transport_error(&e)))?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(ProviderError::not_found(KIND, title));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::authentication(
                    KIND,
                    format!("download returned HTTP {}", status.as_u16()),
                ));
            }
            s if !s.is_success() => {
                return Err(ProviderError::download(
                    KIND,
                    title,
                    format!("HTTP {}", s.as_u16()),
                ));
            }
            _ => {}
        }

        stream_to_file(KIND, response, output_dir, title, ARTIFACT_EXTENSION).await
    }
}

impl std::fmt::Debug for CopernicusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopernicusClient")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for CopernicusClient {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self, criteria), fields(provider = %KIND, product_type = criteria.product_type()))]
    async fn query(&self, criteria: &SearchCriteria) -> Result<Vec<ProductRecord>, ProviderError> {
        if !self
            .product_types
            .iter()
            .any(|t| t == criteria.product_type())
        {
            return Err(ProviderError::unsupported_by(KIND, criteria.product_type()));
        }

        let session = self.open_session()?;
        let result = self.search(&session, criteria).await;
        drop(session);

        if let Ok(records) = &result {
            info!(count = records.len(), "Sentinel query found {} scenes", records.len());
        }
        result
    }

    #[instrument(skip(self, record, output_dir), fields(provider = %KIND, product = %record))]
    async fn download(
        &self,
        record: &ProductRecord,
        output_dir: &Path,
    ) -> Result<PathBuf, ProviderError> {
        info!("requested Sentinel product");
        let session = self.open_session()?;
        let result = self.fetch(&session, record, output_dir).await;
        drop(session);
        result
    }
}

/// Per-call authenticated connection to the hub.
///
/// Basic auth is attached to every request; the underlying client and its
/// connection pool are released when the session is dropped.
struct HubSession<'a> {
    client: Client,
    credentials: &'a Credentials,
}

impl HubSession<'_> {
    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.client.get(url).basic_auth(
            self.credentials.username(),
            Some(self.credentials.password()),
        )
    }
}

impl Drop for HubSession<'_> {
    fn drop(&mut self) {
        debug!(provider = %KIND, "session released");
    }
}

/// OData path of a product's archive.
///
/// The uuid comes from a records file, so it is percent-encoded to stay
/// inside the `Products('...')` key segment.
fn product_value_path(uuid: &str) -> String {
    format!("odata/v1/Products('{}')/$value", urlencoding::encode(uuid))
}

/// Builds the OpenSearch `q` expression for the criteria.
///
/// Dates cover `[start T00:00:00Z, end T00:00:00Z]` on `beginposition`; the
/// footprint filter intersects the bounding-box polygon.
pub(crate) fn build_search_query(criteria: &SearchCriteria) -> String {
    format!(
        "beginposition:[{} TO {}] AND producttype:{} AND footprint:\"Intersects({})\"",
        format_hub_date(criteria.start_date()),
        format_hub_date(criteria.end_date()),
        criteria.product_type(),
        criteria.bbox().to_wkt_polygon(),
    )
}

fn format_hub_date(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    feed: Feed,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "opensearch:totalResults", default)]
    total_results: Option<Value>,
    #[serde(default)]
    entry: Option<OneOrMany>,
}

/// The hub encodes a single-result feed as an object instead of an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Value>),
    One(Value),
}

impl Feed {
    fn total_results(&self) -> Option<usize> {
        match self.total_results.as_ref()? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            _ => None,
        }
    }

    fn entries(self) -> Vec<Value> {
        match self.entry {
            Some(OneOrMany::Many(entries)) => entries,
            Some(OneOrMany::One(entry)) => vec![entry],
            None => Vec::new(),
        }
    }
}

/// Normalizes one OpenSearch entry into a record.
///
/// `id` becomes `uuid`; `title`, `summary` and the primary `link` are copied;
/// every typed `{name, content}` attribute is flattened to `name -> content`.
fn entry_to_record(entry: &Value) -> Option<ProductRecord> {
    let object = entry.as_object()?;
    let uuid = object.get("id")?.as_str()?.to_string();

    let mut attributes = Map::new();
    for section in TYPED_SECTIONS {
        for item in as_items(object.get(section)) {
            if let (Some(name), Some(content)) = (
                item.get("name").and_then(Value::as_str),
                item.get("content"),
            ) {
                attributes.insert(name.to_string(), content.clone());
            }
        }
    }

    attributes.insert("uuid".to_string(), Value::String(uuid));
    for key in ["title", "summary"] {
        if let Some(value) = object.get(key).and_then(Value::as_str) {
            attributes.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    if let Some(href) = primary_link(object.get("link")) {
        attributes.insert("link".to_string(), Value::String(href));
    }

    Some(ProductRecord::new(KIND, attributes))
}

fn as_items(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => Vec::new(),
    }
}

/// The link without a `rel` attribute is the product download link.
fn primary_link(value: Option<&Value>) -> Option<String> {
    as_items(value)
        .into_iter()
        .find(|link| link.get("rel").is_none())
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}
