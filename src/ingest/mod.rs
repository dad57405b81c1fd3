//! Open-data dataset ingestion into the raw bucket.
//!
//! Two Opendatasoft access paths are supported: the whole-dataset CSV export
//! and the paginated Explore v2.1 records API. Either way the raw bucket
//! receives a CSV under `{prefix}{role}.csv` for datasets that feed the
//! cleaner, `{prefix}{id}.csv` for the rest.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::{DatasetConfig, DatasetRole, FetchMode, IngestConfig};
use crate::store::ObjectStore;

#[derive(Clone)]
pub struct DatasetFetcher {
    client: ClientWithMiddleware,
    page_limit: usize,
    max_records: usize,
    export_timezone: String,
}

#[derive(Debug, Deserialize)]
struct RecordsPage {
    #[serde(default)]
    results: Vec<Value>,
}

impl DatasetFetcher {
    pub fn new(cfg: &IngestConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_seconds))
            .user_agent(concat!("smart-energy/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(200), Duration::from_secs(10))
            .build_with_max_retries(cfg.max_retries);
        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(policy))
            .build();
        Ok(Self {
            client,
            page_limit: cfg.page_limit.max(1),
            max_records: cfg.max_records,
            export_timezone: cfg.export_timezone.clone(),
        })
    }

    pub fn export_url(&self, ds: &DatasetConfig) -> Result<Url> {
        let base = ds.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/explore/dataset/{}/download/", ds.id))
            .with_context(|| format!("invalid base url '{}'", ds.base_url))?;
        url.query_pairs_mut()
            .append_pair("format", "csv")
            .append_pair("timezone", &self.export_timezone)
            .append_pair("use_labels_for_header", "true");
        for (field, value) in &ds.refine {
            url.query_pairs_mut().append_pair(&format!("refine.{field}"), value);
        }
        Ok(url)
    }

    pub fn records_url(&self, ds: &DatasetConfig, offset: usize) -> Result<Url> {
        let base = ds.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!(
            "{base}/api/explore/v2.1/catalog/datasets/{}/records",
            ds.id
        ))
        .with_context(|| format!("invalid base url '{}'", ds.base_url))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("limit", &self.page_limit.to_string());
            q.append_pair("offset", &offset.to_string());
            for (field, value) in &ds.refine {
                q.append_pair(&format!("refine.{field}"), value);
            }
        }
        Ok(url)
    }

    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let status = resp.status();
        let body = resp.bytes().await.context("reading response body failed")?;
        if !status.is_success() {
            anyhow::bail!(
                "open data API error: HTTP {status}: {}",
                String::from_utf8_lossy(&body)
            );
        }
        Ok(body.to_vec())
    }

    /// Whole-dataset CSV export, byte for byte as served.
    pub async fn fetch_export(&self, ds: &DatasetConfig) -> Result<Vec<u8>> {
        let url = self.export_url(ds)?;
        info!(dataset = %ds.id, %url, "downloading export");
        self.get_bytes(url).await
    }

    /// All records of a dataset, page by page, until an empty page or
    /// `max_records`.
    pub async fn fetch_records(&self, ds: &DatasetConfig) -> Result<Vec<Map<String, Value>>> {
        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            let url = self.records_url(ds, offset)?;
            debug!(dataset = %ds.id, offset, "fetching records page");
            let body = self.get_bytes(url).await?;
            let page: RecordsPage = serde_json::from_slice(&body)
                .with_context(|| format!("records page at offset {offset} is not valid JSON"))?;
            if page.results.is_empty() {
                break;
            }
            let n = page.results.len();
            records.extend(page.results.into_iter().filter_map(flatten_record));
            offset += n;
            if records.len() >= self.max_records {
                warn!(dataset = %ds.id, max = self.max_records, "record cap reached, stopping");
                records.truncate(self.max_records);
                break;
            }
        }
        info!(dataset = %ds.id, records = records.len(), "records fetched");
        Ok(records)
    }

    /// Fetch a dataset as CSV bytes, whichever access path it is configured for.
    pub async fn fetch_csv(&self, ds: &DatasetConfig) -> Result<Vec<u8>> {
        match ds.mode {
            FetchMode::Export => self.fetch_export(ds).await,
            FetchMode::Records => {
                let records = self.fetch_records(ds).await?;
                records_to_csv(&records, ds.delimiter_byte()?)
            }
        }
    }
}

/// v2.1 records are flat; older payloads nest the values under `fields`.
fn flatten_record(record: Value) -> Option<Map<String, Value>> {
    match record {
        Value::Object(mut map) => match map.remove("fields") {
            Some(Value::Object(fields)) => Some(fields),
            Some(other) => {
                map.insert("fields".to_string(), other);
                Some(map)
            }
            None => Some(map),
        },
        _ => None,
    }
}

/// Render records as CSV; the header is the union of keys in first-seen
/// order.
pub fn records_to_csv(records: &[Map<String, Value>], delimiter: u8) -> Result<Vec<u8>> {
    let mut header: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !header.contains(&key.as_str()) {
                header.push(key);
            }
        }
    }

    let mut writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(Vec::new());
    writer.write_record(&header)?;
    for record in records {
        let row = header.iter().map(|k| match record.get(*k) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        });
        writer.write_record(row)?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing CSV buffer failed: {}", e.error()))
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct StageSummary {
    pub staged: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Raw-bucket key of the dataset feeding `role`.
pub fn role_key(prefix: &str, role: DatasetRole) -> String {
    format!("{prefix}{role}.csv")
}

pub fn raw_key(prefix: &str, ds: &DatasetConfig) -> String {
    match ds.role {
        Some(role) => role_key(prefix, role),
        None => format!("{prefix}{}.csv", ds.id),
    }
}

/// Fetch every configured dataset into the raw bucket. One dataset failing
/// does not stop the others.
pub async fn stage_datasets(
    fetcher: &DatasetFetcher,
    store: &dyn ObjectStore,
    datasets: &[DatasetConfig],
    bucket: &str,
    prefix: &str,
) -> Result<StageSummary> {
    store.ensure_bucket(bucket).await?;
    let mut summary = StageSummary::default();
    for ds in datasets {
        let key = raw_key(prefix, ds);
        let result = async {
            let bytes = fetcher.fetch_csv(ds).await?;
            let size = bytes.len();
            store.put(bucket, &key, bytes).await?;
            Ok::<_, anyhow::Error>(size)
        }
        .await;
        match result {
            Ok(size) => {
                info!(dataset = %ds.id, bucket, key = %key, size, "dataset staged");
                summary.staged.push(ds.id.clone());
            }
            Err(e) => {
                error!(dataset = %ds.id, error = %e, "dataset staging failed");
                summary.failed.push((ds.id.clone(), format!("{e:#}")));
            }
        }
    }
    Ok(summary)
}
