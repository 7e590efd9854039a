//! Scripted in-memory providers for pipeline tests.
//!
//! [`MockFactory`] hands out fresh [`MockClient`]s that all share one
//! [`MockState`], so tests can script failures across attempts and inspect
//! call counts afterwards.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use satflow::{
    ProductRecord, ProviderClient, ProviderError, ProviderFactory, ProviderKind, SearchCriteria,
};
use serde_json::{Value, json};

/// Shared script and counters for every client built by a [`MockFactory`].
#[derive(Default)]
pub struct MockState {
    records: Mutex<HashMap<String, Vec<ProductRecord>>>,
    query_failures: Mutex<HashMap<String, usize>>,
    download_failures: Mutex<HashMap<String, usize>>,
    auth_failures: Mutex<HashMap<String, usize>>,
    missing_credentials: Mutex<HashSet<ProviderKind>>,
    gone: Mutex<HashSet<String>>,
    panics: Mutex<HashSet<String>>,
    download_delay: Mutex<Option<Duration>>,
    pub creates: AtomicUsize,
    pub queries: AtomicUsize,
    pub downloads: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

/// Factory over a shared [`MockState`].
#[derive(Clone, Default)]
pub struct MockFactory {
    pub state: Arc<MockState>,
}

#[allow(dead_code)]
impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records returned for `product_type`.
    pub fn with_records(self, product_type: &str, records: Vec<ProductRecord>) -> Self {
        self.state
            .records
            .lock()
            .unwrap()
            .insert(product_type.to_string(), records);
        self
    }

    /// The next `n` queries for `product_type` fail with a transient query error.
    pub fn failing_queries(self, product_type: &str, n: usize) -> Self {
        self.state
            .query_failures
            .lock()
            .unwrap()
            .insert(product_type.to_string(), n);
        self
    }

    /// The next `n` downloads of `id` fail with a transient download error.
    pub fn failing_downloads(self, id: &str, n: usize) -> Self {
        self.state
            .download_failures
            .lock()
            .unwrap()
            .insert(id.to_string(), n);
        self
    }

    /// The next `n` calls keyed by `key` (a product type for queries, a
    /// record identifier for downloads) fail with an authentication error.
    pub fn failing_auth(self, key: &str, n: usize) -> Self {
        self.state
            .auth_failures
            .lock()
            .unwrap()
            .insert(key.to_string(), n);
        self
    }

    /// Downloads of `id` fail with `NotFound`.
    pub fn gone(self, id: &str) -> Self {
        self.state.gone.lock().unwrap().insert(id.to_string());
        self
    }

    /// Downloads of `id` panic inside the worker task.
    pub fn panicking(self, id: &str) -> Self {
        self.state.panics.lock().unwrap().insert(id.to_string());
        self
    }

    /// Creating a client for `kind` fails with a configuration error.
    pub fn without_credentials(self, kind: ProviderKind) -> Self {
        self.state.missing_credentials.lock().unwrap().insert(kind);
        self
    }

    /// Every download sleeps this long before writing.
    pub fn with_download_delay(self, delay: Duration) -> Self {
        *self.state.download_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn creates(&self) -> usize {
        self.state.creates.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.state.queries.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.state.downloads.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for MockFactory {
    fn create(&self, kind: ProviderKind) -> Result<Box<dyn ProviderClient>, ProviderError> {
        self.state.creates.fetch_add(1, Ordering::SeqCst);
        if self.state.missing_credentials.lock().unwrap().contains(&kind) {
            let (user_var, _) = kind.credential_vars();
            return Err(ProviderError::missing_credential(kind, user_var));
        }
        Ok(Box::new(MockClient {
            kind,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Client reading its behavior from the shared state.
pub struct MockClient {
    kind: ProviderKind,
    state: Arc<MockState>,
}

fn take_one(map: &Mutex<HashMap<String, usize>>, key: &str) -> bool {
    let mut map = map.lock().unwrap();
    match map.get_mut(key) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn query(&self, criteria: &SearchCriteria) -> Result<Vec<ProductRecord>, ProviderError> {
        self.state.queries.fetch_add(1, Ordering::SeqCst);
        let product_type = criteria.product_type();
        if take_one(&self.state.auth_failures, product_type) {
            return Err(ProviderError::authentication(self.kind, "session rejected"));
        }
        if take_one(&self.state.query_failures, product_type) {
            return Err(ProviderError::query(self.kind, product_type, "HTTP 503"));
        }
        Ok(self
            .state
            .records
            .lock()
            .unwrap()
            .get(product_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn download(
        &self,
        record: &ProductRecord,
        output_dir: &Path,
    ) -> Result<PathBuf, ProviderError> {
        self.state.downloads.fetch_add(1, Ordering::SeqCst);
        let id = record.identifier().unwrap_or("unnamed").to_string();

        if self.state.panics.lock().unwrap().contains(&id) {
            panic!("scripted panic for {id}");
        }
        if self.state.gone.lock().unwrap().contains(&id) {
            return Err(ProviderError::not_found(self.kind, id));
        }
        if take_one(&self.state.auth_failures, &id) {
            return Err(ProviderError::authentication(
                self.kind,
                "download returned HTTP 401",
            ));
        }
        if take_one(&self.state.download_failures, &id) {
            return Err(ProviderError::download(self.kind, id, "connection reset"));
        }

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.state.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let path = output_dir.join(format!("{id}.bin"));
        let written = tokio::fs::write(&path, id.as_bytes()).await;
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        written.map_err(|e| ProviderError::io(path.clone(), e))?;
        Ok(path)
    }
}

/// A tagged Copernicus record.
#[allow(dead_code)]
pub fn sentinel(uuid: &str) -> ProductRecord {
    record(json!({"provider": "copernicus", "uuid": uuid, "title": format!("S2A_{uuid}")}))
}

/// A tagged EarthExplorer record.
#[allow(dead_code)]
pub fn landsat(entity_id: &str) -> ProductRecord {
    record(json!({
        "provider": "earth_explorer",
        "entity_id": entity_id,
        "display_id": format!("LC08_{entity_id}"),
        "dataset": "landsat_8_c1"
    }))
}

/// Any record shape, tagged or not.
pub fn record(value: Value) -> ProductRecord {
    serde_json::from_value(value).unwrap()
}
