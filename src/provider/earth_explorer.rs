//! USGS EarthExplorer client for Landsat products.
//!
//! Talks to the machine-to-machine (M2M) JSON API: every endpoint is a `POST`
//! with a JSON body, answered by an envelope carrying `data`, `errorCode` and
//! `errorMessage`. A session is an API key obtained from `login`, sent as
//! `X-Auth-Token`, and released with `logout`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::http::{
    HttpSettings, build_http_client, describe_transport_error, endpoint, parse_base_url,
    stream_to_file,
};
use super::{
    Credentials, ProductRecord, ProviderClient, ProviderError, ProviderKind, SearchCriteria,
};

/// Default M2M JSON API root.
pub const DEFAULT_EARTH_EXPLORER_URL: &str = "https://m2m.cr.usgs.gov/api/api/json/stable/";

/// Header carrying the session API key.
const AUTH_HEADER: &str = "X-Auth-Token";

/// Scenes requested per `scene-search` page.
const PAGE_SIZE: usize = 100;

/// Label attached to download requests so they can be found in the USGS console.
const DOWNLOAD_LABEL: &str = "satflow";

/// Extension for Landsat bundles when the server does not name the file.
const ARTIFACT_EXTENSION: &str = ".tar";

const KIND: ProviderKind = ProviderKind::EarthExplorer;

/// Client for the USGS EarthExplorer M2M API.
pub struct EarthExplorerClient {
    credentials: Credentials,
    base_url: Url,
    http: HttpSettings,
    product_types: Vec<String>,
}

impl EarthExplorerClient {
    /// Creates a client for the API rooted at `base_url`.
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

    /// Creates a client using `LANDSATXPLORE_USERNAME`/`LANDSATXPLORE_PASSWORD`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] when a variable is missing or
    /// the base URL is invalid.
    pub fn from_env(base_url: &str, http: &HttpSettings) -> Result<Self, ProviderError> {
        Self::new(Credentials::from_env(KIND)?, base_url, http)
    }

    /// Adds datasets this client accepts beyond the built-in list.
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

    async fn login(&self) -> Result<ApiSession, ProviderError> {
        let client = build_http_client(KIND, &self.http)?;
        let body = json!({
            "username": self.credentials.username(),
            "password": self.credentials.password(),
        });
        let timeout = self.http.request_timeout();
        let api_key: String = send(&client, &self.base_url, timeout, "login", None, &body)
            .await
            .and_then(|data| data.ok_or(CallError::Api("login returned no API key".to_string())))
            .and_then(decode)
            .map_err(|e| ProviderError::authentication(KIND, e.to_string()))?;

        debug!(provider = %KIND, "session opened");
        Ok(ApiSession {
            client,
            base_url: self.base_url.clone(),
            timeout,
            api_key,
        })
    }

    /// Releases the session. Failures are logged and never replace the
    /// outcome of the call the session served.
    async fn logout(&self, session: ApiSession) {
        match send(
            &session.client,
            &session.base_url,
            session.timeout,
            "logout",
            Some(&session.api_key),
            &Value::Null,
        )
        .await
        {
            Ok(_) => debug!(provider = %KIND, "session released"),
            Err(error) => warn!(provider = %KIND, error = %error, "logout failed"),
        }
    }

    async fn search(
        &self,
        session: &ApiSession,
        criteria: &SearchCriteria,
    ) -> Result<Vec<ProductRecord>, ProviderError> {
        let dataset = criteria.product_type();
        let scene_filter = scene_filter(criteria);

        let mut records = Vec::new();
        let mut read = 0usize;
        loop {
            let body = json!({
                "datasetName": dataset,
                "maxResults": PAGE_SIZE,
                "startingNumber": read + 1,
                "sceneFilter": scene_filter,
            });
            let page: SceneSearchData = session
                .call("scene-search", &body)
                .await
                .map_err(|e| e.into_query(dataset))?;

            let page_len = page.results.len();
            read += page_len;
            records.extend(page.results.iter().filter_map(|scene| {
                let record = scene_to_record(dataset, scene);
                if record.is_none() {
                    warn!(provider = %KIND, "skipping scene without entityId");
                }
                record
            }));

            let exhausted = match page.total_hits {
                Some(total) => read >= total,
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
        session: &ApiSession,
        record: &ProductRecord,
        output_dir: &Path,
    ) -> Result<PathBuf, ProviderError> {
        let entity_id = record.field_str("entity_id").ok_or_else(|| {
            ProviderError::download(KIND, record.label(), "record carries no entity_id field")
        })?;
        let display_id = record.field_str("display_id").unwrap_or(entity_id);
        let dataset = record.field_str("dataset").ok_or_else(|| {
            ProviderError::download(KIND, display_id, "record carries no dataset field")
        })?;

        let options: Vec<DownloadOption> = session
            .call_optional(
                "download-options",
                &json!({ "datasetName": dataset, "entityIds": [entity_id] }),
            )
            .await
            .map_err(|e| e.into_download(display_id))?
            .unwrap_or_default();

        let option = options
            .into_iter()
            .find(|option| option.available)
            .ok_or_else(|| ProviderError::not_found(KIND, display_id))?;
        debug!(product_id = %option.id, "selected download option");

        let request: DownloadRequestData = session
            .call(
                "download-request",
                &json!({
                    "downloads": [{ "entityId": entity_id, "productId": option.id }],
                    "label": DOWNLOAD_LABEL,
                }),
            )
            .await
            .map_err(|e| e.into_download(display_id))?;

        let url = match request.available_downloads.into_iter().next() {
            Some(download) => download.url,
            None if !request.preparing_downloads.is_empty() => {
                return Err(ProviderError::download(
                    KIND,
                    display_id,
                    "download is still being prepared by the archive",
                ));
            }
            None => {
                return Err(ProviderError::download(
                    KIND,
                    display_id,
                    "download request returned no URL",
                ));
            }
        };
        debug!(%url, "fetching artifact");

        let response = session
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::download(KIND, display_id, describe_transport_error(&e)))?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(ProviderError::not_found(KIND, display_id));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::authentication(
                    KIND,
                    format!("artifact request returned HTTP {}", status.as_u16()),
                ));
            }
            s if !s.is_success() => {
                return Err(ProviderError::download(
                    KIND,
                    display_id,
                    format!("HTTP {}", s.as_u16()),
                ));
            }
            _ => {}
        }

        stream_to_file(KIND, response, output_dir, display_id, ARTIFACT_EXTENSION).await
    }
}

impl std::fmt::Debug for EarthExplorerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EarthExplorerClient")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for EarthExplorerClient {
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

        let session = self.login().await?;
        let result = self.search(&session, criteria).await;
        self.logout(session).await;

        if let Ok(records) = &result {
            info!(count = records.len(), "Landsat query found {} scenes", records.len());
        }
        result
    }

    #[instrument(skip(self, record, output_dir), fields(provider = %KIND, product = %record))]
    async fn download(
        &self,
        record: &ProductRecord,
        output_dir: &Path,
    ) -> Result<PathBuf, ProviderError> {
        info!("requested Landsat scene");
        let session = self.login().await?;
        let result = self.fetch(&session, record, output_dir).await;
        self.logout(session).await;
        result
    }
}

/// An open M2M session.
struct ApiSession {
    client: Client,
    base_url: Url,
    timeout: Duration,
    api_key: String,
}

impl ApiSession {
    async fn call_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<Option<T>, CallError> {
        send(
            &self.client,
            &self.base_url,
            self.timeout,
            path,
            Some(&self.api_key),
            body,
        )
            .await?
            .map(decode)
            .transpose()
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, CallError> {
        self.call_optional(path, body)
            .await?
            .ok_or_else(|| CallError::Api(format!("{path} returned no data")))
    }
}

/// Failure of a single M2M call, before it is attributed to a query or a download.
#[derive(Debug)]
enum CallError {
    Auth(String),
    Transport(String),
    Api(String),
}

impl CallError {
    fn into_query(self, product_type: &str) -> ProviderError {
        match self {
            Self::Auth(reason) => ProviderError::authentication(KIND, reason),
            Self::Transport(reason) | Self::Api(reason) => {
                ProviderError::query(KIND, product_type, reason)
            }
        }
    }

    fn into_download(self, product: &str) -> ProviderError {
        match self {
            Self::Auth(reason) => ProviderError::authentication(KIND, reason),
            Self::Transport(reason) | Self::Api(reason) => {
                ProviderError::download(KIND, product, reason)
            }
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(reason) | Self::Transport(reason) | Self::Api(reason) => {
                f.write_str(reason)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Posts `body` to `path` and unwraps the M2M envelope.
async fn send(
    client: &Client,
    base_url: &Url,
    timeout: Duration,
    path: &str,
    api_key: Option<&str>,
    body: &Value,
) -> Result<Option<Value>, CallError> {
    let url = endpoint(KIND, base_url, path).map_err(|e| CallError::Api(e.to_string()))?;
    let mut request = client.post(url).timeout(timeout).json(body);
    if let Some(key) = api_key {
        request = request.header(AUTH_HEADER, key);
    }

    let response = request
        .send()
        .await
        .map_err(|e| CallError::Transport(describe_transport_error(&e)))?;

    let status = response.status();
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(CallError::Auth(format!("{path} returned HTTP {}", status.as_u16())));
    }

    let envelope: ApiResponse = match response.json().await {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(CallError::Api(format!("{path} returned HTTP {}", status.as_u16())));
        }
        Err(e) => return Err(CallError::Api(format!("malformed {path} response: {e}"))),
    };

    if let Some(code) = envelope.error_code.filter(|code| !code.is_empty()) {
        let message = envelope.error_message.unwrap_or_default();
        let reason = format!("{path} failed with {code}: {message}");
        return Err(if code.starts_with("AUTH_") {
            CallError::Auth(reason)
        } else {
            CallError::Api(reason)
        });
    }
    if !status.is_success() {
        return Err(CallError::Api(format!("{path} returned HTTP {}", status.as_u16())));
    }

    Ok(envelope.data.filter(|data| !data.is_null()))
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, CallError> {
    serde_json::from_value(data).map_err(|e| CallError::Api(format!("unexpected response data: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneSearchData {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    total_hits: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadOption {
    id: String,
    #[serde(default)]
    available: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequestData {
    #[serde(default)]
    available_downloads: Vec<AvailableDownload>,
    #[serde(default)]
    preparing_downloads: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AvailableDownload {
    url: String,
}

/// Builds the `sceneFilter` for a search: bounding rectangle plus
/// acquisition dates.
fn scene_filter(criteria: &SearchCriteria) -> Value {
    let lower_left = criteria.bbox().lower_left();
    let upper_right = criteria.bbox().upper_right();
    json!({
        "spatialFilter": {
            "filterType": "mbr",
            "lowerLeft": { "latitude": lower_left.lat, "longitude": lower_left.lon },
            "upperRight": { "latitude": upper_right.lat, "longitude": upper_right.lon },
        },
        "acquisitionFilter": {
            "start": criteria.start_date().format("%Y-%m-%d").to_string(),
            "end": criteria.end_date().format("%Y-%m-%d").to_string(),
        },
    })
}

/// Normalizes one `scene-search` result into a record.
fn scene_to_record(dataset: &str, scene: &Value) -> Option<ProductRecord> {
    let entity_id = scene.get("entityId").and_then(scalar_to_string)?;

    let mut attributes = Map::new();
    attributes.insert("entity_id".to_string(), Value::String(entity_id));
    attributes.insert("dataset".to_string(), Value::String(dataset.to_string()));
    if let Some(display_id) = scene.get("displayId").and_then(scalar_to_string) {
        attributes.insert("display_id".to_string(), Value::String(display_id));
    }
    let acquired = scene
        .pointer("/temporalCoverage/startDate")
        .or_else(|| scene.get("acquisitionDate"));
    if let Some(acquired) = acquired.filter(|v| !v.is_null()) {
        attributes.insert("acquisition_date".to_string(), acquired.clone());
    }
    if let Some(cloud_cover) = scene.get("cloudCover").filter(|v| !v.is_null()) {
        attributes.insert("cloud_cover".to_string(), cloud_cover.clone());
    }
    if let Some(published) = scene.get("publishDate").filter(|v| !v.is_null()) {
        attributes.insert("publish_date".to_string(), published.clone());
    }

    Some(ProductRecord::new(KIND, attributes))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
