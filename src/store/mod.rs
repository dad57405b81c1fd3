//! Object storage for the raw / silver / gold data layers.
//!
//! Two backends share one trait: a directory tree for local runs and an
//! S3-compatible HTTP API (MinIO in deployments) for shared storage.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

pub mod local;
pub mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket unless it already exists.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

pub fn from_config(cfg: &StoreConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        StoreBackend::Local => Arc::new(LocalObjectStore::new(&cfg.local_root)),
        StoreBackend::S3 => Arc::new(S3ObjectStore::from_config(cfg)?),
    };
    info!(backend = ?cfg.backend, "object store ready");
    Ok(store)
}

/// Create the three layer buckets.
pub async fn ensure_layer_buckets(store: &dyn ObjectStore, cfg: &StoreConfig) -> Result<()> {
    for bucket in [&cfg.raw_bucket, &cfg.silver_bucket, &cfg.gold_bucket] {
        store.ensure_bucket(bucket).await?;
    }
    Ok(())
}

/// Keys are relative, `/`-separated, and may not climb out of their bucket.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') {
        anyhow::bail!("invalid object key '{key}'");
    }
    if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        anyhow::bail!("invalid object key '{key}'");
    }
    Ok(())
}

pub(crate) fn validate_bucket(bucket: &str) -> Result<()> {
    let ok = (3..=63).contains(&bucket.len())
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && !bucket.starts_with(['-', '.'])
        && !bucket.ends_with(['-', '.']);
    if !ok {
        anyhow::bail!("invalid bucket name '{bucket}'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("raw/consommation.csv", true)]
    #[case("clean.parquet", true)]
    #[case("../etc/passwd", false)]
    #[case("/abs", false)]
    #[case("a//b", false)]
    #[case("", false)]
    fn test_validate_key(#[case] key: &str, #[case] ok: bool) {
        assert_eq!(validate_key(key).is_ok(), ok);
    }

    #[rstest]
    #[case("raw", true)]
    #[case("silver-2024", true)]
    #[case("Gold", false)]
    #[case("ab", false)]
    #[case("-raw", false)]
    fn test_validate_bucket(#[case] bucket: &str, #[case] ok: bool) {
        assert_eq!(validate_bucket(bucket).is_ok(), ok);
    }

    #[tokio::test]
    async fn test_ensure_layer_buckets_on_local_backend() {
        let root = std::env::temp_dir().join(format!("smart-energy-store-{}", uuid::Uuid::new_v4()));
        let cfg = StoreConfig {
            local_root: root.clone(),
            ..StoreConfig::default()
        };
        let store = from_config(&cfg).unwrap();
        ensure_layer_buckets(store.as_ref(), &cfg).await.unwrap();
        for bucket in ["raw", "silver", "gold"] {
            assert!(root.join(bucket).is_dir());
        }
        std::fs::remove_dir_all(root).ok();
    }
}
