use serde_json::{json, Value};
use shared::{QueueJob, TaskStatus};

use crate::test_utils::TestApp;

#[tokio::test]
async fn create_backtest_queues_job_with_config_timeframe() {
    let app = TestApp::new().await;
    let strategy = app.seed_strategy("sample_strategy.py").await;
    let config = app.seed_config("config.json", json!({ "timeframe": "1h" })).await;

    let response = app
        .server
        .post("/api/backtests")
        .json(&json!({
            "name": "Hourly run",
            "strategyId": strategy.id,
            "configId": config.id.to_string(),
            "timerangeStart": "2024-01-01",
            "timerangeEnd": "2024-02-01",
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["timeframe"], "1h");
    assert_eq!(body["strategy"]["className"], "SampleStrategy");
    assert_eq!(body["config"]["filename"], "config.json");

    let id = body["id"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&id).is_ok());
    assert_eq!(app.queue.jobs(), vec![QueueJob::backtest(id)]);
}

#[tokio::test]
async fn create_backtest_validates_input() {
    let app = TestApp::new().await;
    let strategy = app.seed_strategy("sample_strategy.py").await;
    let no_timeframe = app.seed_config("config.json", json!({ "exchange": {} })).await;

    let missing = app
        .server
        .post("/api/backtests")
        .json(&json!({ "name": "x" }))
        .await;
    assert_eq!(missing.status_code(), 400);
    assert_eq!(missing.json::<Value>()["error"], "Missing required fields");

    let unknown_config = app
        .server
        .post("/api/backtests")
        .json(&json!({ "name": "x", "strategyId": strategy.id, "configId": 999 }))
        .await;
    assert_eq!(unknown_config.status_code(), 404);

    let without_timeframe = app
        .server
        .post("/api/backtests")
        .json(&json!({ "name": "x", "strategyId": strategy.id, "configId": no_timeframe.id }))
        .await;
    assert_eq!(without_timeframe.status_code(), 400);

    assert!(app.queue.jobs().is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new().await;
    let response = app
        .server
        .post("/api/backtests")
        .text("{not json")
        .content_type("application/json")
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["error"], "Invalid request body");
}

#[tokio::test]
async fn list_and_get_backtests() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;

    let list = app.server.get("/api/backtests").await;
    assert_eq!(list.status_code(), 200);
    let list: Value = list.json();
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], task.id.as_str());

    let filtered: Value = app
        .server
        .get("/api/backtests")
        .add_query_param("strategyId", task.strategy_id + 1)
        .await
        .json();
    assert!(filtered.as_array().unwrap().is_empty());

    let bad_filter = app
        .server
        .get("/api/backtests")
        .add_query_param("strategyId", "abc")
        .await;
    assert_eq!(bad_filter.status_code(), 400);

    let found = app.server.get(&format!("/api/backtests/{}", task.id)).await;
    assert_eq!(found.status_code(), 200);
    assert_eq!(found.json::<Value>()["name"], "Sample run");

    let missing = app.server.get("/api/backtests/does-not-exist").await;
    assert_eq!(missing.status_code(), 404);
}

#[tokio::test]
async fn retry_resets_results_and_requeues() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;
    let task = app.complete_backtest(task, &["BTC/USDT"]).await;

    let response = app.server.post(&format!("/api/backtests/{}/retry", task.id)).await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["completedAt"], Value::Null);
    assert_eq!(body["resultsSummary"], Value::Null);
    assert_eq!(body["rawOutputPath"], Value::Null);
    assert_eq!(body["logs"], "");
    assert_eq!(app.queue.jobs(), vec![QueueJob::backtest(task.id.clone())]);

    let missing = app.server.post("/api/backtests/nope/retry").await;
    assert_eq!(missing.status_code(), 404);
}

#[tokio::test]
async fn plot_requires_result_file() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;

    let pending = app.server.post(&format!("/api/backtests/{}/plot", task.id)).await;
    assert_eq!(pending.status_code(), 400);

    let task = app.complete_backtest(task, &[]).await;
    let queued = app.server.post(&format!("/api/backtests/{}/plot", task.id)).await;
    assert_eq!(queued.status_code(), 200);
    assert_eq!(queued.json::<Value>()["message"], "Plot generation task queued");
    assert_eq!(app.queue.jobs(), vec![QueueJob::plot(task.id.clone())]);
}

#[tokio::test]
async fn available_pairs_are_computed_then_cached() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;
    let task = app
        .complete_backtest(task, &["ETH/USDT", "BTC/USDT", "ETH/USDT"])
        .await;
    let url = format!("/api/backtests/{}/available-pairs", task.id);

    let first: Value = app.server.get(&url).await.json();
    assert_eq!(first["success"], true);
    assert_eq!(first["cached"], false);
    assert_eq!(first["data"]["pairs"], json!(["BTC/USDT", "ETH/USDT"]));
    assert_eq!(first["data"]["totalPairs"], 2);
    assert_eq!(first["data"]["defaultPair"], "BTC/USDT");

    let second: Value = app.server.get(&url).await.json();
    assert_eq!(second["cached"], true);
    assert_eq!(second["data"], first["data"]);
}

#[tokio::test]
async fn available_pairs_rejects_bad_ids() {
    let app = TestApp::new().await;

    let invalid = app.server.get("/api/backtests/not-a-uuid/available-pairs").await;
    assert_eq!(invalid.status_code(), 400);
    assert_eq!(invalid.json::<Value>()["success"], false);

    let missing = app
        .server
        .get(&format!("/api/backtests/{}/available-pairs", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(missing.status_code(), 404);
    assert_eq!(missing.json::<Value>()["error"], "Backtest not found");
}

#[tokio::test]
async fn chart_data_reads_candles_and_trades() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;
    let task = app.complete_backtest(task, &["BTC/USDT", "ETH/USDT"]).await;
    app.write_file(
        "data/binance/BTC_USDT-5m.json",
        "[[1704067200000, 100.0, 102.0, 99.0, 101.0, 12.5], [1704067500000, 101.0, 103.0, 100.0, 102.0, 8.0]]",
    );

    let response = app
        .server
        .get(&format!("/api/backtests/{}/chart-data", task.id))
        .add_query_param("pair", "BTC/USDT")
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["timeframe"], "5m");
    let candles = body["candles"].as_array().unwrap();
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0]["time"], 1704067200);
    assert_eq!(candles[0]["high"], 102.0);
    let trades = body["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0]["pair"], "BTC/USDT");
}

#[tokio::test]
async fn chart_data_without_file_has_no_candles() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;

    let no_pair = app.server.get(&format!("/api/backtests/{}/chart-data", task.id)).await;
    assert_eq!(no_pair.status_code(), 400);

    let body: Value = app
        .server
        .get(&format!("/api/backtests/{}/chart-data", task.id))
        .add_query_param("pair", "kraken:XBT/EUR")
        .add_query_param("timeframe", "1h")
        .await
        .json();
    assert_eq!(body["candles"], json!([]));
    assert_eq!(body["trades"], json!([]));

    let missing = app
        .server
        .get("/api/backtests/missing/chart-data")
        .add_query_param("pair", "BTC/USDT")
        .await;
    assert_eq!(missing.status_code(), 404);
}

#[tokio::test]
async fn log_stream_relays_frames() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;
    app.log_bus.publish(&format!("logs:{}", task.id), "Loading data");
    app.log_bus.publish(&format!("logs:{}", task.id), "Backtesting done");

    let response = app.server.get(&format!("/api/backtests/{}/logs/stream", task.id)).await;
    assert_eq!(response.status_code(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = response.text();
    assert!(body.contains("Connected to backtest log stream..."));
    assert!(body.contains(r#"data: {"log":"Loading data""#));
    let first = body.find("Loading data").unwrap();
    let second = body.find("Backtesting done").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn log_stream_skips_greeting_when_logs_exist() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;
    let task = app.set_backtest_logs(task, "previous output").await;
    app.log_bus.publish(&format!("logs:{}", task.id), "Resumed");

    let response = app.server.get(&format!("/api/backtests/{}/logs/stream", task.id)).await;
    assert_eq!(response.status_code(), 200);

    let body = response.text();
    assert!(!body.contains("Connected to backtest log stream..."));
    assert!(body.contains(r#"data: {"log":"Resumed""#));
}

#[tokio::test]
async fn log_stream_for_unknown_backtest_is_404() {
    let app = TestApp::new().await;
    let response = app.server.get("/api/backtests/unknown/logs/stream").await;
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.text(), "Backtest task not found");

    let plot = app.server.get("/api/backtests/unknown/plot/logs/stream").await;
    assert_eq!(plot.status_code(), 404);
}

#[tokio::test]
async fn completed_status_survives_reads() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;
    let task = app.complete_backtest(task, &["BTC/USDT"]).await;
    assert_eq!(task.status, TaskStatus::Completed);

    let body: Value = app.server.get(&format!("/api/backtests/{}", task.id)).await.json();
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["resultsSummary"]["totalTrades"], 1);
}

#[tokio::test]
async fn plot_files_are_served_from_user_data() {
    let app = TestApp::new().await;
    app.write_file("plots/freqtrade-plot-BTC_USDT-5m.html", "<html>plot</html>");

    let response = app.server.get("/api/plots/freqtrade-plot-BTC_USDT-5m.html").await;
    assert_eq!(response.status_code(), 200);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(response.text(), "<html>plot</html>");

    let missing = app.server.get("/api/plots/nothing.html").await;
    assert_eq!(missing.status_code(), 404);
}
