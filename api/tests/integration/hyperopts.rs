use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, IntoActiveModel};
use serde_json::{json, Value};
use shared::entity::{backtest_tasks, hyperopt_tasks};
use shared::{QueueJob, TaskStatus};

use crate::test_utils::TestApp;

const RESULTS: &str = r#"{"loss": 0.5, "is_best": true, "current_epoch": 1, "params_details": {"buy": {"buy_rsi": 25}}, "results_metrics": {"total_trades": 10}}
{"loss": 0.9, "is_best": false, "current_epoch": 2, "params_details": {"buy": {"buy_rsi": 40}}, "results_metrics": {"total_trades": 4}}
{"loss": 0.2, "is_best": true, "current_epoch": 3, "params_details": {"buy": {"buy_rsi": 28}, "sell": {"sell_rsi": 75}, "stoploss": {"stoploss": -0.05}}, "results_metrics": {"total_trades": 12}}
"#;

async fn complete_hyperopt(app: &TestApp, task: hyperopt_tasks::Model) -> hyperopt_tasks::Model {
    app.write_file("hyperopt_results/run.fthypt", RESULTS);
    let mut active = task.into_active_model();
    active.status = Set(TaskStatus::Completed);
    active.results_path = Set(Some("hyperopt_results/run.fthypt".to_string()));
    active.best_result = Set(Some(json!({
        "loss": 0.2,
        "params": { "buy": { "buy_rsi": 28 }, "sell": { "sell_rsi": 75 }, "stoploss": -0.05 },
    })));
    active.update(app.state.db.as_ref()).await.expect("complete hyperopt")
}

#[tokio::test]
async fn create_hyperopt_queues_job() {
    let app = TestApp::new().await;
    let strategy = app.seed_strategy("sample_strategy.py").await;
    let config = app.seed_config("config.json", json!({ "timeframe": "5m" })).await;

    let response = app
        .server
        .post("/api/hyperopts")
        .json(&json!({
            "strategyId": strategy.id.to_string(),
            "configId": config.id,
            "epochs": "50",
            "spaces": "buy sell",
            "lossFunction": "SharpeHyperOptLoss",
            "jobWorkers": 2,
        }))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["epochs"], 50);
    assert_eq!(body["jobWorkers"], 2);
    assert_eq!(body["strategy"]["id"], strategy.id);
    assert_eq!(body["generatedBacktests"], json!([]));

    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(app.queue.jobs(), vec![QueueJob::hyperopt(id)]);
}

#[tokio::test]
async fn create_hyperopt_validates_input() {
    let app = TestApp::new().await;
    let strategy = app.seed_strategy("sample_strategy.py").await;

    let missing = app
        .server
        .post("/api/hyperopts")
        .json(&json!({ "strategyId": strategy.id, "configId": 1 }))
        .await;
    assert_eq!(missing.status_code(), 400);

    let no_config = app
        .server
        .post("/api/hyperopts")
        .json(&json!({
            "strategyId": strategy.id,
            "configId": 42,
            "epochs": 10,
            "spaces": "buy",
            "lossFunction": "SharpeHyperOptLoss",
        }))
        .await;
    assert_eq!(no_config.status_code(), 404);
    assert!(app.queue.jobs().is_empty());
}

#[tokio::test]
async fn delete_removes_generated_backtests() {
    let app = TestApp::new().await;
    let task = app.seed_hyperopt().await;

    let generated = app
        .state
        .backtests()
        .create(api::repositories::NewBacktest {
            name: "From hyperopt".to_string(),
            strategy_id: task.strategy_id,
            config_id: task.config_id,
            timeframe: "5m".to_string(),
            timerange_start: None,
            timerange_end: None,
        })
        .await
        .unwrap();
    let mut active = generated.clone().into_active_model();
    active.source_hyperopt_task_id = Set(Some(task.id.clone()));
    active.update(app.state.db.as_ref()).await.unwrap();

    let detail: Value = app.server.get(&format!("/api/hyperopts/{}", task.id)).await.json();
    assert_eq!(detail["generatedBacktests"][0]["id"], generated.id.as_str());

    let response = app.server.delete(&format!("/api/hyperopts/{}", task.id)).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>(), json!({ "success": true }));

    let remaining = backtest_tasks::Entity::find_by_id(generated.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap();
    assert!(remaining.is_none());
    assert_eq!(app.server.get(&format!("/api/hyperopts/{}", task.id)).await.status_code(), 404);
    assert_eq!(app.server.delete(&format!("/api/hyperopts/{}", task.id)).await.status_code(), 404);
}

#[tokio::test]
async fn retry_removes_old_log_and_requeues() {
    let app = TestApp::new().await;
    let task = app.seed_hyperopt().await;
    app.write_file("logs/hyperopt.log", "epoch 1/10");
    let mut active = task.into_active_model();
    active.status = Set(TaskStatus::Failed);
    active.log_path = Set(Some("logs/hyperopt.log".to_string()));
    active.logs = Set("old output".to_string());
    let task = active.update(app.state.db.as_ref()).await.unwrap();

    let logs: Value = app.server.get(&format!("/api/hyperopts/{}/logs", task.id)).await.json();
    assert_eq!(logs["logs"], "epoch 1/10");

    let response = app.server.post(&format!("/api/hyperopts/{}/retry", task.id)).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["logPath"], Value::Null);
    assert_eq!(body["logs"], "");
    assert!(!app.path().join("logs/hyperopt.log").exists());
    assert_eq!(app.queue.jobs(), vec![QueueJob::hyperopt(task.id.clone())]);

    let logs: Value = app.server.get(&format!("/api/hyperopts/{}/logs", task.id)).await.json();
    assert_eq!(logs["logs"], "");
}

#[tokio::test]
async fn results_pick_the_best_flagged_epoch() {
    let app = TestApp::new().await;
    let task = app.seed_hyperopt().await;

    let none = app.server.get(&format!("/api/hyperopts/{}/results", task.id)).await;
    assert_eq!(none.status_code(), 404);

    let task = complete_hyperopt(&app, task).await;
    let response = app.server.get(&format!("/api/hyperopts/{}/results", task.id)).await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["totalEpochs"], 3);
    assert_eq!(body["best"]["epoch"], 3);
    assert_eq!(body["best"]["loss"], 0.2);
    assert_eq!(body["best"]["params"]["buy"]["buy_rsi"], 28);
}

#[tokio::test]
async fn download_results_as_attachment() {
    let app = TestApp::new().await;
    let task = app.seed_hyperopt().await;

    let missing = app.server.get(&format!("/api/hyperopts/{}/results/download", task.id)).await;
    assert_eq!(missing.status_code(), 404);

    let task = complete_hyperopt(&app, task).await;
    let response = app.server.get(&format!("/api/hyperopts/{}/results/download", task.id)).await;
    assert_eq!(response.status_code(), 200);
    let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
    assert_eq!(disposition, r#"attachment; filename="run.fthypt""#);
    assert_eq!(response.text(), RESULTS);
}

#[tokio::test]
async fn apply_rewrites_strategy_and_keeps_backup() {
    let app = TestApp::new().await;
    let task = app.seed_hyperopt().await;

    let not_done = app.server.post(&format!("/api/hyperopts/{}/apply", task.id)).await;
    assert_eq!(not_done.status_code(), 400);

    let task = complete_hyperopt(&app, task).await;
    let response = app.server.post(&format!("/api/hyperopts/{}/apply", task.id)).await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    let backup = body["backupPath"].as_str().unwrap();
    assert!(backup.contains("sample_strategy.py.backup."));
    assert!(std::path::Path::new(backup).exists());

    let source = std::fs::read_to_string(app.path().join("strategies/sample_strategy.py")).unwrap();
    assert!(source.contains("buy_rsi = 28"));
    assert!(source.contains("sell_rsi = 75"));
    assert!(source.contains("stoploss = -0.05"));
}

#[tokio::test]
async fn log_stream_uses_hyperopt_channel() {
    let app = TestApp::new().await;
    let task = app.seed_hyperopt().await;
    app.log_bus.publish(&format!("hyperopt-logs:{}", task.id), "Epoch 1/10");

    let response = app.server.get(&format!("/api/hyperopts/{}/logs/stream", task.id)).await;
    assert_eq!(response.status_code(), 200);
    let body = response.text();
    assert!(body.contains(r#""log":"Epoch 1/10""#));
    assert!(!body.contains("Connected to backtest log stream"));
}
