mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{silent_rate_endpoint, spawn_app, spawn_app_with, test_config};
use ledgerflow::config::Environment;
use ledgerflow::db::sync::RunCounters;
use ledgerflow::router::report_cache;
use ledgerflow::service::sync_actor;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn sync_routes_require_a_session() {
    let app = spawn_app(Environment::Test).await;
    for (method, uri) in [
        ("GET", "/api/sync/check"),
        ("GET", "/api/sync/status"),
        ("GET", "/api/sync/summary"),
        ("POST", "/api/sync/trigger"),
    ] {
        let reply = app.send(method, uri, None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn new_user_needs_a_first_sync() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("fresh@example.com").await;

    let check = app.send("GET", "/api/sync/check", Some(&cookie), None).await;
    assert_eq!(check.status, StatusCode::OK);
    assert_eq!(check.body["data"]["needsSync"], true);

    let status = app.send("GET", "/api/sync/status", Some(&cookie), None).await;
    assert_eq!(status.body["data"]["reasons"], json!(["neverSynced"]));
    assert!(status.body["data"]["lastSyncAt"].is_null());
}

#[tokio::test]
async fn trigger_materializes_due_recurring_and_clears_needs_sync() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("recurring@example.com").await;
    let rent = app.create_account(&cookie, "Expenses", "Rent", "CNY").await;
    let wallet = app.create_account(&cookie, "Assets", "Wallet", "CNY").await;

    let today = Utc::now().date_naive();
    let start = today - Duration::days(2);
    let recurring = app
        .send(
            "POST",
            "/api/recurring-transactions",
            Some(&cookie),
            Some(json!({
                "accountId": rent,
                "type": "EXPENSE",
                "amount": "12.5",
                "description": "coffee",
                "frequency": "DAILY",
                "startDate": start.to_string(),
            })),
        )
        .await;
    assert_eq!(recurring.status, StatusCode::CREATED, "{}", recurring.body);

    let summary = app.send("GET", "/api/sync/summary", Some(&cookie), None).await;
    assert_eq!(summary.body["data"]["pending"]["dueRecurring"], 1);
    let status = app.send("GET", "/api/sync/status", Some(&cookie), None).await;
    let reasons = status.body["data"]["reasons"].as_array().expect("reasons").clone();
    assert!(reasons.contains(&json!("recurringDue")));

    let run = app
        .send("POST", "/api/sync/trigger?wait=true", Some(&cookie), None)
        .await;
    assert_eq!(run.status, StatusCode::OK, "{}", run.body);
    assert_eq!(run.body["data"]["state"], "completed");
    assert_eq!(run.body["data"]["processedRecurring"], 3);
    assert_eq!(run.body["data"]["refreshedBalances"], 2);

    let list = app
        .send("GET", &format!("/api/transactions?accountId={rent}"), Some(&cookie), None)
        .await;
    assert_eq!(list.body["data"]["total"], 3);

    let check = app.send("GET", "/api/sync/check", Some(&cookie), None).await;
    assert_eq!(check.body["data"]["needsSync"], false);

    // a second run finds nothing left to generate
    let again = app
        .send("POST", "/api/sync/trigger?wait=true", Some(&cookie), None)
        .await;
    assert_eq!(again.body["data"]["processedRecurring"], 0);

    let summary = app.send("GET", "/api/sync/summary", Some(&cookie), None).await;
    assert_eq!(summary.body["data"]["recentRuns"].as_array().map(Vec::len), Some(2));
    assert_eq!(summary.body["data"]["status"], "completed");

    // editing ledger data marks derived data stale again
    let entry = app
        .send(
            "POST",
            "/api/transactions",
            Some(&cookie),
            Some(json!({
                "accountId": wallet,
                "type": "BALANCE",
                "amount": "300",
                "date": today.to_string(),
            })),
        )
        .await;
    assert_eq!(entry.status, StatusCode::CREATED, "{}", entry.body);
    let status = app.send("GET", "/api/sync/status", Some(&cookie), None).await;
    assert_eq!(status.body["data"]["needsSync"], true);
    assert_eq!(status.body["data"]["reasons"], json!(["dataChanged"]));
}

#[tokio::test]
async fn trigger_without_wait_is_accepted() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("async@example.com").await;

    let reply = app.send("POST", "/api/sync/trigger", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.body["data"]["started"], true);
    assert!(reply.body["data"]["runId"].is_string());
}

#[tokio::test]
async fn second_trigger_while_running_conflicts() {
    let mut cfg = test_config(Environment::Test);
    cfg.fx.provider_url = Some(silent_rate_endpoint().await);
    let app = spawn_app_with(cfg).await;
    let cookie = app.register("busy@example.com").await;
    // a second enabled currency makes the run ask the provider, which never answers
    let enable = app
        .send("POST", "/api/user/currencies", Some(&cookie), Some(json!({ "code": "USD" })))
        .await;
    assert_eq!(enable.status, StatusCode::OK);

    let first = app.send("POST", "/api/sync/trigger", Some(&cookie), None).await;
    assert_eq!(first.status, StatusCode::ACCEPTED, "{}", first.body);

    let second = app.send("POST", "/api/sync/trigger", Some(&cookie), None).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["success"], false);
    assert_eq!(second.body["error"], "Sync already running");

    let status = app.send("GET", "/api/sync/status", Some(&cookie), None).await;
    assert_eq!(status.body["data"]["status"], "processing");
    assert_eq!(status.body["data"]["needsSync"], false);
    assert_eq!(status.body["data"]["reasons"], json!([]));

    // other users are not blocked by it
    let other = app.register("idle@example.com").await;
    let reply = app.send("POST", "/api/sync/trigger", Some(&other), None).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn restart_fails_runs_left_in_progress() {
    let app = spawn_app(Environment::Test).await;
    let (cookie, user_id) = app.register_user("crash@example.com").await;

    let run_id = app.storage.begin_sync_run(&user_id).await.expect("begin run");
    let status = app.send("GET", "/api/sync/status", Some(&cookie), None).await;
    assert_eq!(status.body["data"]["status"], "processing");

    // a fresh actor over the same database recovers the dangling run
    let cfg = Arc::new(test_config(Environment::Test));
    sync_actor::spawn(app.storage.clone(), &cfg.sync, None, report_cache(&cfg))
        .await
        .expect("respawn sync actor");

    let status = app.send("GET", "/api/sync/status", Some(&cookie), None).await;
    let data = &status.body["data"];
    assert_eq!(data["status"], "failed");
    assert_eq!(data["lastError"], "interrupted");
    assert_eq!(data["needsSync"], true);
    assert_eq!(data["reasons"], json!(["neverSynced", "lastRunFailed"]));

    let summary = app.send("GET", "/api/sync/summary", Some(&cookie), None).await;
    let last = &summary.body["data"]["lastRun"];
    assert_eq!(last["id"], run_id.as_str());
    assert_eq!(last["state"], "failed");
    assert_eq!(last["error"], "interrupted");
    assert!(last["finishedAt"].is_string());
}

#[tokio::test]
async fn failed_run_keeps_last_sync_and_asks_for_another() {
    let app = spawn_app(Environment::Test).await;
    let (cookie, user_id) = app.register_user("flaky@example.com").await;

    let run = app
        .send("POST", "/api/sync/trigger?wait=true", Some(&cookie), None)
        .await;
    assert_eq!(run.body["data"]["state"], "completed");
    let status = app.send("GET", "/api/sync/status", Some(&cookie), None).await;
    let synced_at = status.body["data"]["lastSyncAt"].clone();
    assert!(synced_at.is_string());

    let run_id = app.storage.begin_sync_run(&user_id).await.expect("begin run");
    app.storage
        .finish_sync_run(&user_id, &run_id, Err("rate source unreachable".to_string()))
        .await
        .expect("finish run");

    let status = app.send("GET", "/api/sync/status", Some(&cookie), None).await;
    let data = &status.body["data"];
    assert_eq!(data["status"], "failed");
    assert_eq!(data["lastSyncAt"], synced_at);
    assert_eq!(data["lastError"], "rate source unreachable");
    assert_eq!(data["reasons"], json!(["lastRunFailed"]));

    let check = app.send("GET", "/api/sync/check", Some(&cookie), None).await;
    assert_eq!(check.body["data"]["needsSync"], true);
}

#[tokio::test]
async fn old_sync_reads_as_stale() {
    let app = spawn_app(Environment::Test).await;
    let (cookie, user_id) = app.register_user("stale@example.com").await;

    let run = app
        .send("POST", "/api/sync/trigger?wait=true", Some(&cookie), None)
        .await;
    assert_eq!(run.body["data"]["state"], "completed");
    let check = app.send("GET", "/api/sync/check", Some(&cookie), None).await;
    assert_eq!(check.body["data"]["needsSync"], false);

    // default window is 24 hours
    sqlx::query("UPDATE sync_status SET last_sync_at = ? WHERE user_id = ?")
        .bind(Utc::now() - Duration::hours(25))
        .bind(&user_id)
        .execute(app.storage.pool())
        .await
        .expect("age last sync");

    let check = app.send("GET", "/api/sync/check", Some(&cookie), None).await;
    assert_eq!(check.status, StatusCode::OK);
    assert_eq!(check.body["data"]["needsSync"], true);
    let status = app.send("GET", "/api/sync/status", Some(&cookie), None).await;
    assert_eq!(status.body["data"]["reasons"], json!(["stale"]));
}

#[tokio::test]
async fn writes_made_during_a_run_still_need_sync() {
    let app = spawn_app(Environment::Test).await;
    let (cookie, user_id) = app.register_user("midrun@example.com").await;
    let wallet = app.create_account(&cookie, "Assets", "Wallet", "CNY").await;

    let run_id = app.storage.begin_sync_run(&user_id).await.expect("begin run");
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let entry = app
        .send(
            "POST",
            "/api/transactions",
            Some(&cookie),
            Some(json!({
                "accountId": wallet,
                "type": "BALANCE",
                "amount": "80",
                "date": Utc::now().date_naive().to_string(),
            })),
        )
        .await;
    assert_eq!(entry.status, StatusCode::CREATED, "{}", entry.body);
    app.storage
        .finish_sync_run(&user_id, &run_id, Ok(RunCounters::default()))
        .await
        .expect("finish run");

    let summary = app.send("GET", "/api/sync/summary", Some(&cookie), None).await;
    let data = &summary.body["data"];
    assert_eq!(data["status"], "completed");
    assert_eq!(data["lastSyncAt"], data["lastRun"]["startedAt"]);
    assert_eq!(data["needsSync"], true);
    assert_eq!(data["reasons"], json!(["dataChanged"]));
}
