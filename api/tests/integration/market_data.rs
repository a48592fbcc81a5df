use serde_json::{json, Value};
use shared::QueueJob;

use crate::test_utils::TestApp;

const CANDLES: &str = "[[1704067200000, 1.0, 2.0, 0.5, 1.5, 10.0], [1704153600000, 1.5, 2.5, 1.0, 2.0, 12.0]]";

#[tokio::test]
async fn download_job_accepts_comma_separated_pairs() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/data/download")
        .json(&json!({
            "exchange": "binance",
            "pairs": "BTC/USDT, ETH/USDT",
            "timeframes": ["5m", "1h"],
            "timerangeStart": "2024-01-01",
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["marketType"], "spot");
    assert_eq!(body["pairs"], json!(["BTC/USDT", "ETH/USDT"]));
    assert_eq!(body["timeframes"], json!(["5m", "1h"]));

    let id = body["id"].as_i64().unwrap() as i32;
    assert_eq!(app.queue.jobs(), vec![QueueJob::data_download(id)]);
}

#[tokio::test]
async fn download_job_validation() {
    let app = TestApp::new().await;

    let missing = app
        .server
        .post("/api/data/download")
        .json(&json!({ "exchange": "binance", "pairs": ["BTC/USDT"] }))
        .await;
    assert_eq!(missing.status_code(), 400);

    let string_timeframes = app
        .server
        .post("/api/data/download")
        .json(&json!({ "exchange": "binance", "pairs": ["BTC/USDT"], "timeframes": "5m" }))
        .await;
    assert_eq!(string_timeframes.status_code(), 400);

    let empty_pairs = app
        .server
        .post("/api/data/download")
        .json(&json!({ "exchange": "binance", "pairs": [], "timeframes": ["5m"] }))
        .await;
    assert_eq!(empty_pairs.status_code(), 400);

    assert!(app.queue.jobs().is_empty());
}

#[tokio::test]
async fn scan_import_search_and_delete() {
    let app = TestApp::new().await;
    app.write_file("data/binance/BTC_USDT-1d.json", CANDLES);
    app.write_file("data/kraken/ETH_EUR-1h.feather", "binary");
    app.write_file("data/kraken/readme.md", "ignored");

    let scan: Value = app.server.get("/api/market-data/import").await.json();
    assert_eq!(scan["data"]["total"], 2);
    assert_eq!(scan["data"]["available"], 2);
    let files = scan["data"]["files"].as_array().unwrap();
    assert_eq!(files[0]["pair"], "BTC/USDT");
    assert_eq!(files[0]["timeframe"], "1d");
    assert_eq!(files[1]["format"], "feather");

    let response = app
        .server
        .post("/api/market-data/import")
        .json(&json!({ "files": [
            { "filename": "BTC_USDT-1d.json", "exchange": "binance", "pair": "BTC/USDT", "timeframe": "1d", "format": "json" },
            { "filename": "ETH_EUR-1h.feather", "exchange": "kraken", "pair": "ETH/EUR", "timeframe": "1h", "format": "feather" },
            { "filename": "gone.json", "exchange": "binance", "pair": "XRP/USDT", "timeframe": "1d", "format": "json" },
        ]}))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["data"]["imported"], 2);
    assert_eq!(body["data"]["errors"][0]["error"], "File not found in data directory");

    let btc = &body["data"]["marketData"][0];
    assert_eq!(btc["status"], "available");
    assert!(btc["startTime"].as_str().unwrap().starts_with("2024-01-01"));
    assert!(btc["endTime"].as_str().unwrap().starts_with("2024-01-02"));
    assert_eq!(body["data"]["marketData"][1]["startTime"], Value::Null);

    let rescan: Value = app.server.get("/api/market-data/import").await.json();
    assert_eq!(rescan["data"]["available"], 0);

    let found: Value = app
        .server
        .get("/api/data")
        .add_query_param("search", "KRAKEN")
        .await
        .json();
    let found = found.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["pair"], "ETH/EUR");

    for literal in ["_", "%"] {
        let wildcard: Value = app
            .server
            .get("/api/data")
            .add_query_param("search", literal)
            .await
            .json();
        assert!(wildcard.as_array().unwrap().is_empty(), "{} matched rows", literal);
    }

    let id = btc["id"].as_i64().unwrap();
    let deleted = app.server.delete(&format!("/api/data/{}", id)).await;
    assert_eq!(deleted.status_code(), 200);
    assert!(!app.path().join("data/binance/BTC_USDT-1d.json").exists());
    assert_eq!(app.server.delete(&format!("/api/data/{}", id)).await.status_code(), 404);

    let all: Value = app.server.get("/api/data").await.json();
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn download_log_stream() {
    let app = TestApp::new().await;
    let job: Value = app
        .server
        .post("/api/data/download")
        .json(&json!({ "exchange": "binance", "pairs": ["BTC/USDT"], "timeframes": ["5m"] }))
        .await
        .json();
    let id = job["id"].as_i64().unwrap();
    app.log_bus.publish(&format!("logs:{}", id), "Downloading BTC/USDT");

    let response = app.server.get(&format!("/api/data/{}/logs", id)).await;
    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains(r#""log":"Downloading BTC/USDT""#));

    let missing = app.server.get("/api/data/9999/logs").await;
    assert_eq!(missing.status_code(), 404);
}
