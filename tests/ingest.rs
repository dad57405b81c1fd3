mod common;

use serde_json::json;
use smart_energy::config::{Config, DatasetConfig, DatasetRole, FetchMode, IngestConfig, StoreBackend};
use smart_energy::domain::columns::TOTAL_CONSUMPTION;
use smart_energy::ingest::{stage_datasets, DatasetFetcher};
use smart_energy::pipeline::{run_clean, CleanInputs};
use smart_energy::store::{self, LocalObjectStore, ObjectStore};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dataset(server: &MockServer, id: &str, mode: FetchMode) -> DatasetConfig {
    DatasetConfig {
        id: id.to_string(),
        base_url: server.uri(),
        mode,
        refine: Vec::new(),
        role: None,
        delimiter: ';',
    }
}

fn ingest_config(datasets: Vec<DatasetConfig>) -> IngestConfig {
    IngestConfig {
        datasets,
        page_limit: 2,
        max_records: 100,
        http_timeout_seconds: 5,
        max_retries: 0,
        ..IngestConfig::default()
    }
}

async fn mount_page(server: &MockServer, id: &str, offset: usize, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/explore/v2.1/catalog/datasets/{id}/records")))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_records_are_paged_until_an_empty_page() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "eco2mix",
        0,
        json!({"total_count": 3, "results": [
            {"date": "2024-01-01", "consommation": 61000},
            {"date": "2024-01-02", "consommation": 60500}
        ]}),
    )
    .await;
    mount_page(
        &server,
        "eco2mix",
        2,
        json!({"results": [{"fields": {"date": "2024-01-03", "consommation": 59000, "region": "IDF"}}]}),
    )
    .await;
    mount_page(&server, "eco2mix", 3, json!({"results": []})).await;

    let ds = dataset(&server, "eco2mix", FetchMode::Records);
    let fetcher = DatasetFetcher::new(&ingest_config(vec![ds.clone()])).unwrap();
    let records = fetcher.fetch_records(&ds).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2]["region"], "IDF");

    let csv = String::from_utf8(fetcher.fetch_csv(&ds).await.unwrap()).unwrap();
    let mut lines = csv.lines();
    let header: Vec<&str> = lines.next().unwrap().split(';').collect();
    assert_eq!(header.len(), 3);
    assert!(header.contains(&"region"));
    assert_eq!(lines.count(), 3);
}

#[tokio::test]
async fn test_record_cap_stops_paging() {
    let server = MockServer::start().await;
    mount_page(&server, "capped", 0, json!({"results": [{"v": 1}, {"v": 2}]})).await;

    let ds = dataset(&server, "capped", FetchMode::Records);
    let cfg = IngestConfig {
        max_records: 1,
        ..ingest_config(vec![ds.clone()])
    };
    let records = DatasetFetcher::new(&cfg).unwrap().fetch_records(&ds).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_stage_keeps_going_when_one_dataset_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/explore/dataset/conso/download/"))
        .and(query_param("format", "csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Date - Heure;Consommation brute totale (MW)\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/explore/dataset/missing/download/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown dataset"))
        .mount(&server)
        .await;

    let datasets = vec![
        dataset(&server, "missing", FetchMode::Export),
        dataset(&server, "conso", FetchMode::Export),
    ];
    let fetcher = DatasetFetcher::new(&ingest_config(datasets.clone())).unwrap();
    let dir = common::temp_dir("ingest");
    let store = LocalObjectStore::new(&dir);

    let summary = stage_datasets(&fetcher, &store, &datasets, "raw", "raw/").await.unwrap();
    assert_eq!(summary.staged, vec!["conso".to_string()]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "missing");
    assert!(summary.failed[0].1.contains("404"));

    let staged = store.get("raw", "raw/conso.csv").await.unwrap();
    assert!(String::from_utf8(staged).unwrap().starts_with("Date - Heure;"));
    assert!(store.get("raw", "raw/missing.csv").await.is_err());

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn test_fetched_datasets_feed_clean_from_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/explore/dataset/conso-idf/download/"))
        .and(query_param("refine.region", "Île-de-France"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::consumption_csv(30)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/explore/dataset/meteo-paris/download/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::weather_csv(30)))
        .mount(&server)
        .await;

    let dir = common::temp_dir("fetch-clean");
    let mut cfg = Config::default();
    cfg.store.backend = StoreBackend::Local;
    cfg.store.local_root = dir.join("store");
    cfg.paths.output_parquet = dir.join("clean.parquet");
    cfg.ingest = ingest_config(vec![
        DatasetConfig {
            refine: vec![("region".to_string(), "Île-de-France".to_string())],
            role: Some(DatasetRole::Consumption),
            ..dataset(&server, "conso-idf", FetchMode::Export)
        },
        DatasetConfig {
            role: Some(DatasetRole::Weather),
            delimiter: ',',
            ..dataset(&server, "meteo-paris", FetchMode::Export)
        },
    ]);

    let store = store::from_config(&cfg.store).unwrap();
    store::ensure_layer_buckets(store.as_ref(), &cfg.store).await.unwrap();
    let fetcher = DatasetFetcher::new(&cfg.ingest).unwrap();
    let summary = stage_datasets(
        &fetcher,
        store.as_ref(),
        &cfg.ingest.datasets,
        &cfg.store.raw_bucket,
        &cfg.store.raw_prefix,
    )
    .await
    .unwrap();
    assert!(summary.failed.is_empty(), "{:?}", summary.failed);

    let inputs = CleanInputs::from_raw_bucket(&cfg).unwrap();
    let out = run_clean(&cfg, &inputs, Some(store.as_ref()), true).await.unwrap();
    assert_eq!(out.table.len(), 30);
    let total = out.table.value(0, TOTAL_CONSUMPTION).unwrap();
    assert!((total - common::daily_total(0)).abs() < 1e-6);
    assert_eq!(out.staged.len(), 2);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn test_export_is_staged_byte_for_byte() {
    let server = MockServer::start().await;
    // Latin-1 "é" is not valid UTF-8.
    let body: Vec<u8> = b"Date;Station\n2024-01-01;Orl\xe9ans\n".to_vec();
    Mock::given(method("GET"))
        .and(path("/explore/dataset/latin1/download/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let ds = dataset(&server, "latin1", FetchMode::Export);
    let fetcher = DatasetFetcher::new(&ingest_config(vec![ds.clone()])).unwrap();
    assert_eq!(fetcher.fetch_export(&ds).await.unwrap(), body);
}
