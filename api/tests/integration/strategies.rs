use axum_test::multipart::{MultipartForm, Part};
use serde_json::{json, Value};

use crate::test_utils::{TestApp, SAMPLE_STRATEGY};

fn strategy_form(filename: &str, content: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text("description", "RSI crossover")
        .add_part(
            "file",
            Part::bytes(content.as_bytes().to_vec())
                .file_name(filename)
                .mime_type("text/x-python"),
        )
}

#[tokio::test]
async fn upload_writes_file_and_registers_class() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/strategies")
        .multipart(strategy_form("rsi.py", SAMPLE_STRATEGY))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["filename"], "rsi.py");
    assert_eq!(body["className"], "SampleStrategy");
    assert_eq!(body["description"], "RSI crossover");
    assert!(app.path().join("strategies/rsi.py").exists());

    let replacement = SAMPLE_STRATEGY.replace("SampleStrategy", "OtherStrategy");
    let duplicate = app
        .server
        .post("/api/strategies")
        .multipart(strategy_form("rsi.py", &replacement))
        .await;
    assert_eq!(duplicate.status_code(), 409);
    let on_disk = std::fs::read_to_string(app.path().join("strategies/rsi.py")).unwrap();
    assert_eq!(on_disk, SAMPLE_STRATEGY);
}

#[tokio::test]
async fn failed_write_leaves_no_record_behind() {
    let app = TestApp::new().await;
    app.write_file("strategies", "not a directory");

    let response = app
        .server
        .post("/api/strategies")
        .multipart(strategy_form("rsi.py", SAMPLE_STRATEGY))
        .await;
    assert_eq!(response.status_code(), 500);
    assert_eq!(response.json::<Value>()["error"], "Failed to upload strategy");

    let list: Value = app.server.get("/api/strategies").await.json();
    assert!(list["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn upload_rejects_files_without_a_class() {
    let app = TestApp::new().await;

    let no_class = app
        .server
        .post("/api/strategies")
        .multipart(strategy_form("empty.py", "print('hello')\n"))
        .await;
    assert_eq!(no_class.status_code(), 400);
    assert_eq!(no_class.json::<Value>()["error"], "Could not parse class name");

    let no_file = app
        .server
        .post("/api/strategies")
        .multipart(MultipartForm::new().add_text("description", "nothing"))
        .await;
    assert_eq!(no_file.status_code(), 400);
    assert_eq!(no_file.json::<Value>()["error"], "No file provided");
}

#[tokio::test]
async fn list_includes_usage_counts() {
    let app = TestApp::new().await;
    app.seed_backtest().await;

    let response = app.server.get("/api/strategies").await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"][0]["className"], "SampleStrategy");
    assert_eq!(body["data"][0]["_count"]["backtestTasks"], 1);
    assert_eq!(body["data"][0]["_count"]["hyperoptTasks"], 0);
}

#[tokio::test]
async fn delete_is_refused_while_backtests_reference_it() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;

    let response = app
        .server
        .delete(&format!("/api/strategies/{}", task.strategy_id))
        .await;
    assert_eq!(response.status_code(), 400);
    assert!(app.path().join("strategies/sample_strategy.py").exists());
}

#[tokio::test]
async fn delete_removes_file_and_record() {
    let app = TestApp::new().await;
    let strategy = app.seed_strategy("lonely.py").await;

    let response = app.server.delete(&format!("/api/strategies/{}", strategy.id)).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["message"], "Strategy deleted successfully");
    assert!(!app.path().join("strategies/lonely.py").exists());

    let again = app.server.delete(&format!("/api/strategies/{}", strategy.id)).await;
    assert_eq!(again.status_code(), 404);

    let bad_id = app.server.delete("/api/strategies/abc").await;
    assert_eq!(bad_id.status_code(), 400);
    assert_eq!(bad_id.json::<Value>()["error"], "Invalid ID format");
}

#[tokio::test]
async fn content_round_trip_updates_class_name() {
    let app = TestApp::new().await;
    let strategy = app.seed_strategy("editable.py").await;
    let url = format!("/api/strategies/{}/content", strategy.id);

    let content: Value = app.server.get(&url).await.json();
    assert_eq!(content["content"], SAMPLE_STRATEGY);

    let renamed = SAMPLE_STRATEGY.replace("class SampleStrategy", "class RenamedStrategy");
    let response = app.server.put(&url).json(&json!({ "content": renamed })).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["className"], "RenamedStrategy");

    let on_disk = std::fs::read_to_string(app.path().join("strategies/editable.py")).unwrap();
    assert!(on_disk.contains("class RenamedStrategy"));

    let empty = app.server.put(&url).json(&json!({ "content": "  " })).await;
    assert_eq!(empty.status_code(), 400);
    let no_class = app.server.put(&url).json(&json!({ "content": "x = 1" })).await;
    assert_eq!(no_class.status_code(), 400);
}

#[tokio::test]
async fn scan_and_import_unregistered_files() {
    let app = TestApp::new().await;
    app.seed_strategy("registered.py").await;
    app.write_file("strategies/fresh.py", SAMPLE_STRATEGY);
    app.write_file("strategies/broken.py", "nothing to see");
    app.write_file("strategies/notes.txt", "not a strategy");

    let scan: Value = app.server.get("/api/strategies/import").await.json();
    assert_eq!(scan["data"]["total"], 3);
    assert_eq!(scan["data"]["available"], 2);
    assert_eq!(scan["data"]["existing"], 1);
    let files = scan["data"]["files"].as_array().unwrap();
    assert_eq!(files[0]["filename"], "broken.py");
    assert_eq!(files[0]["className"], Value::Null);
    assert_eq!(files[1]["className"], "SampleStrategy");

    let response = app
        .server
        .post("/api/strategies/import")
        .json(&json!({ "filenames": ["fresh.py", "broken.py", "registered.py"] }))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["data"]["imported"], 1);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["strategies"][0]["filename"], "fresh.py");
    let errors = body["data"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(|e| e["filename"] == "registered.py"));

    let empty = app
        .server
        .post("/api/strategies/import")
        .json(&json!({ "filenames": [] }))
        .await;
    assert_eq!(empty.status_code(), 400);
}
