use crate::test_utils::TestApp;

#[tokio::test]
async fn dashboard_shows_status_counts() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;

    let response = app.server.get("/").await;
    assert_eq!(response.status_code(), 200);
    let html = response.text();
    assert!(html.contains("Overview"));
    assert!(html.contains(&format!("/backtests/{}", task.id)));
}

#[tokio::test]
async fn backtest_list_page_links_to_details() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;

    let html = app.server.get("/backtests").await.text();
    assert!(html.contains("Sample run"));
    assert!(html.contains(&format!("href=\"/backtests/{}\"", task.id)));
}

#[tokio::test]
async fn detail_page_has_chart_and_log_tabs() {
    let app = TestApp::new().await;
    let task = app.seed_backtest().await;
    let task = app.complete_backtest(task, &["BTC/USDT", "ETH/USDT"]).await;

    let response = app.server.get(&format!("/backtests/{}", task.id)).await;
    assert_eq!(response.status_code(), 200);
    let html = response.text();
    assert!(html.contains("<canvas id=\"chart\""));
    assert!(html.contains("data-tab=\"chart\""));
    assert!(html.contains("EventSource"));
    assert!(html.contains(&format!("/api/backtests/{}/logs/stream", task.id)));
    assert_eq!(html.matches(" selected>").count(), 1);
    assert!(html.contains("ETH"));
}

#[tokio::test]
async fn unknown_pages_are_404() {
    let app = TestApp::new().await;

    let missing = app.server.get("/backtests/does-not-exist").await;
    assert_eq!(missing.status_code(), 404);
    assert!(missing.text().contains("does not exist"));

    let nowhere = app.server.get("/no/such/page").await;
    assert_eq!(nowhere.status_code(), 404);
}
