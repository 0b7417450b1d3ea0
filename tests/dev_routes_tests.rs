mod common;

use axum::http::StatusCode;
use common::spawn_app;
use ledgerflow::config::Environment;

#[tokio::test]
async fn cache_analysis_is_forbidden_outside_development() {
    let app = spawn_app(Environment::Production).await;
    let reply = app.send("GET", "/api/dev/cache-analysis", None, None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["error"], "Only available in development");
}

#[tokio::test]
async fn cache_analysis_reports_cached_reports_in_development() {
    let app = spawn_app(Environment::Development).await;
    let cookie = app.register("dev@example.com").await;

    let sheet = app
        .send("GET", "/api/reports/balance-sheet?asOf=2026-01-31", Some(&cookie), None)
        .await;
    assert_eq!(sheet.status, StatusCode::OK);

    let reply = app.send("GET", "/api/dev/cache-analysis", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["data"]["entries"], 1);
    assert_eq!(reply.body["data"]["entriesByKind"]["balance-sheet"], 1);
    assert_eq!(reply.body["data"]["misses"], 1);
}

#[tokio::test]
async fn health_is_public() {
    let app = spawn_app(Environment::Production).await;
    let reply = app.send("GET", "/api/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["status"], "ok");
}
