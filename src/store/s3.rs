//! S3-compatible backend: path-style requests signed with AWS Signature V4.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode, Url};
use ring::{digest, hmac};
use tracing::{debug, info};

use super::{validate_bucket, validate_key, ObjectStore};
use crate::config::StoreConfig;

const SERVICE: &str = "s3";

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: reqwest::Client,
    endpoint: Url,
    credentials: Credentials,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl S3ObjectStore {
    pub fn new(endpoint: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).with_context(|| format!("invalid store endpoint '{endpoint}'"))?;
        if endpoint.host_str().is_none() {
            anyhow::bail!("store endpoint '{endpoint}' has no host");
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            credentials,
        })
    }

    pub fn from_config(cfg: &StoreConfig) -> Result<Self> {
        Self::new(
            &cfg.endpoint,
            Credentials {
                access_key: cfg.access_key.clone(),
                secret_key: cfg.secret_key.clone(),
                region: cfg.region.clone(),
            },
            Duration::from_secs(cfg.http_timeout_seconds),
        )
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Path relative to the endpoint, percent-encoded the way SigV4 expects.
    fn canonical_path(&self, bucket: &str, key: Option<&str>) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        let mut path = format!("{base}/{}", uri_encode(bucket, true));
        if let Some(key) = key {
            path.push('/');
            path.push_str(&uri_encode(key, false));
        }
        path
    }

    async fn send(
        &self,
        method: Method,
        bucket: &str,
        key: Option<&str>,
        body: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let path = self.canonical_path(bucket, key);
        let host = self.host_header();
        let now = Utc::now();
        let payload_hash = sha256_hex(&body);
        let amz_date = amz_datetime(now);

        let headers = [
            ("host".to_string(), host),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        let authorization = authorization_header(
            &self.credentials,
            SERVICE,
            method.as_str(),
            &path,
            "",
            &headers,
            &payload_hash,
            now,
        );

        let mut url = self.endpoint.clone();
        url.set_path(&path);
        debug!(%method, %url, size = body.len(), "s3 request");

        let resp = self
            .client
            .request(method, url)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date)
            .header("authorization", authorization)
            .body(body)
            .send()
            .await
            .context("object store request failed")?;
        Ok(resp)
    }
}

async fn error_for_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{what}: HTTP {status}: {body}")
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket(bucket)?;
        let head = self.send(Method::HEAD, bucket, None, Vec::new()).await?;
        match head.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let resp = self.send(Method::PUT, bucket, None, Vec::new()).await?;
                error_for_status(resp, &format!("creating bucket {bucket}")).await?;
                info!(bucket, "bucket created");
                Ok(())
            }
            _ => {
                error_for_status(head, &format!("checking bucket {bucket}")).await?;
                Ok(())
            }
        }
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let resp = self.send(Method::PUT, bucket, Some(key), bytes).await?;
        error_for_status(resp, &format!("put {bucket}/{key}")).await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let resp = self.send(Method::GET, bucket, Some(key), Vec::new()).await?;
        let resp = error_for_status(resp, &format!("get {bucket}/{key}")).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

fn amz_datetime(t: DateTime<Utc>) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

fn amz_date(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d").to_string()
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex(digest::digest(&digest::SHA256, data).as_ref())
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, msg).as_ref().to_vec()
}

/// RFC 3986 unreserved characters pass through; `/` only when `encode_slash`
/// is false (object keys keep their separators).
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

pub(crate) fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Build the `Authorization` value. `headers` are lowercase names, all signed.
#[allow(clippy::too_many_arguments)]
pub(crate) fn authorization_header(
    creds: &Credentials,
    service: &str,
    method: &str,
    canonical_uri: &str,
    canonical_query: &str,
    headers: &[(String, String)],
    payload_hash: &str,
    now: DateTime<Utc>,
) -> String {
    let mut headers = headers.to_vec();
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{}\n", v.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );

    let date = amz_date(now);
    let scope = format!("{date}/{}/{service}/aws4_request", creds.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{scope}\n{}",
        amz_datetime(now),
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&creds.secret_key, &date, &creds.region, service);
    let signature = hex(&hmac_sha256(&key, string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        creds.access_key
    )
}
