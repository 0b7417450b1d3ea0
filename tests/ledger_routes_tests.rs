mod common;

use axum::http::StatusCode;
use common::spawn_app;
use ledgerflow::config::Environment;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::str::FromStr;

fn decimal(value: &Value) -> Decimal {
    let text = value.as_str().unwrap_or_else(|| panic!("expected decimal string, got {value}"));
    Decimal::from_str(text).expect("decimal")
}

fn tx(account_id: &str, tx_type: &str, amount: &str, date: &str) -> Value {
    json!({
        "accountId": account_id,
        "type": tx_type,
        "amount": amount,
        "date": date,
        "description": "test entry",
    })
}

#[tokio::test]
async fn transactions_follow_account_kind() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("kinds@example.com").await;
    let wallet = app.create_account(&cookie, "Assets", "Wallet", "CNY").await;
    let food = app.create_account(&cookie, "Expenses", "Food", "CNY").await;

    let reply = app
        .send("POST", "/api/transactions", Some(&cookie), Some(tx(&food, "BALANCE", "10", "2026-03-02")))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["details"][0]["field"], "type");

    let reply = app
        .send("POST", "/api/transactions", Some(&cookie), Some(tx(&wallet, "EXPENSE", "10", "2026-03-02")))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["details"][0]["field"], "type");

    let reply = app
        .send("POST", "/api/transactions", Some(&cookie), Some(tx(&food, "EXPENSE", "-5", "2026-03-02")))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["details"][0]["field"], "amount");

    let reply = app
        .send("POST", "/api/transactions", Some(&cookie), Some(tx(&food, "EXPENSE", "25.50", "2026-03-03")))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    let reply = app
        .send("POST", "/api/transactions", Some(&cookie), Some(tx(&wallet, "BALANCE", "1000", "2026-03-01")))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);

    let list = app
        .send("GET", &format!("/api/transactions?accountId={food}"), Some(&cookie), None)
        .await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body["data"]["total"], 1);
    assert_eq!(list.body["data"]["page"], 1);

    let flow = app
        .send(
            "GET",
            "/api/reports/cash-flow?startDate=2026-03-01&endDate=2026-03-31",
            Some(&cookie),
            None,
        )
        .await;
    assert_eq!(flow.status, StatusCode::OK);
    assert_eq!(decimal(&flow.body["data"]["totals"]["expense"]), dec!(25.50));
    assert_eq!(decimal(&flow.body["data"]["totals"]["net"]), dec!(-25.50));

    let delete = app
        .send("DELETE", &format!("/api/accounts/{food}"), Some(&cookie), None)
        .await;
    assert_eq!(delete.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn accounts_are_scoped_to_their_owner() {
    let app = spawn_app(Environment::Test).await;
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    let wallet = app.create_account(&alice, "Assets", "Wallet", "CNY").await;

    let reply = app
        .send("GET", &format!("/api/accounts/{wallet}"), Some(&bob), None)
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = app
        .send("POST", "/api/transactions", Some(&bob), Some(tx(&wallet, "BALANCE", "1", "2026-03-01")))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["details"][0]["field"], "accountId");
}

#[tokio::test]
async fn account_currency_must_be_enabled() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("fx@example.com").await;
    let assets = app.category_id(&cookie, "Assets").await;

    let reply = app
        .send(
            "POST",
            "/api/accounts",
            Some(&cookie),
            Some(json!({ "name": "Brokerage", "categoryId": assets, "currencyCode": "USD" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["details"][0]["field"], "currencyCode");

    let enable = app
        .send("POST", "/api/user/currencies", Some(&cookie), Some(json!({ "code": "USD" })))
        .await;
    assert_eq!(enable.status, StatusCode::OK);
    app.create_account(&cookie, "Assets", "Brokerage", "USD").await;
}

#[tokio::test]
async fn balance_sheet_converts_to_base_currency() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("sheet@example.com").await;
    app.send("POST", "/api/user/currencies", Some(&cookie), Some(json!({ "code": "USD" })))
        .await;

    let rate = app
        .send(
            "POST",
            "/api/exchange-rates",
            Some(&cookie),
            Some(json!({
                "fromCurrency": "USD",
                "toCurrency": "CNY",
                "rate": "7.2",
                "effectiveDate": "2026-01-01",
            })),
        )
        .await;
    assert_eq!(rate.status, StatusCode::OK, "{}", rate.body);

    let brokerage = app.create_account(&cookie, "Assets", "Brokerage", "USD").await;
    let cash = app.create_account(&cookie, "Assets", "Cash", "CNY").await;
    let card = app.create_account(&cookie, "Liabilities", "Card", "CNY").await;
    for (account, amount) in [(&brokerage, "100"), (&cash, "500"), (&card, "200")] {
        let reply = app
            .send("POST", "/api/transactions", Some(&cookie), Some(tx(account, "BALANCE", amount, "2026-02-01")))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    }

    let sheet = app
        .send("GET", "/api/reports/balance-sheet?asOf=2026-02-28", Some(&cookie), None)
        .await;
    assert_eq!(sheet.status, StatusCode::OK);
    let data = &sheet.body["data"];
    assert_eq!(data["baseCurrency"], "CNY");
    assert_eq!(decimal(&data["totals"]["assets"]), dec!(1220));
    assert_eq!(decimal(&data["totals"]["liabilities"]), dec!(200));
    assert_eq!(decimal(&data["totals"]["netWorth"]), dec!(1020));
    assert_eq!(data["missingRates"], json!([]));

    // before any balance entry every account reads zero
    let early = app
        .send("GET", "/api/reports/balance-sheet?asOf=2026-01-15", Some(&cookie), None)
        .await;
    assert_eq!(decimal(&early.body["data"]["totals"]["netWorth"]), Decimal::ZERO);

    let converted = app
        .send(
            "GET",
            "/api/exchange-rates/convert?from=USD&to=CNY&amount=10&date=2026-02-01",
            Some(&cookie),
            None,
        )
        .await;
    assert_eq!(converted.status, StatusCode::OK);
    assert_eq!(decimal(&converted.body["data"]["result"]), dec!(72));

    let missing = app
        .send(
            "GET",
            "/api/exchange-rates/convert?from=EUR&to=CNY&amount=10&date=2026-02-01",
            Some(&cookie),
            None,
        )
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["details"][0]["field"], "to");
}

#[tokio::test]
async fn category_tree_rejects_type_mismatch_and_cycles() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("cats@example.com").await;
    let expenses = app.category_id(&cookie, "Expenses").await;

    let child = app
        .send(
            "POST",
            "/api/categories",
            Some(&cookie),
            Some(json!({ "name": "Groceries", "parentId": expenses })),
        )
        .await;
    assert_eq!(child.status, StatusCode::CREATED, "{}", child.body);
    assert_eq!(child.body["data"]["categoryType"], "EXPENSE");
    let child_id = child.body["data"]["id"].as_str().expect("id").to_string();

    let mismatch = app
        .send(
            "POST",
            "/api/categories",
            Some(&cookie),
            Some(json!({ "name": "Salary", "parentId": expenses, "type": "INCOME" })),
        )
        .await;
    assert_eq!(mismatch.status, StatusCode::BAD_REQUEST);

    let cycle = app
        .send(
            "PUT",
            &format!("/api/categories/{expenses}"),
            Some(&cookie),
            Some(json!({ "name": "Expenses", "parentId": child_id })),
        )
        .await;
    assert_eq!(cycle.status, StatusCode::BAD_REQUEST);

    let tree = app.send("GET", "/api/categories", Some(&cookie), None).await;
    let top = tree.body["data"]
        .as_array()
        .expect("tree")
        .iter()
        .find(|c| c["id"] == expenses.as_str())
        .expect("expenses node")
        .clone();
    assert_eq!(top["children"][0]["name"], "Groceries");

    let delete = app
        .send("DELETE", &format!("/api/categories/{expenses}"), Some(&cookie), None)
        .await;
    assert_eq!(delete.status, StatusCode::CONFLICT);
}

async fn child_category(app: &common::TestApp, cookie: &str, parent: &str, name: &str) -> String {
    let reply = app
        .send(
            "POST",
            "/api/categories",
            Some(cookie),
            Some(json!({ "name": name, "parentId": parent })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    reply.body["data"]["id"].as_str().expect("category id").to_string()
}

#[tokio::test]
async fn category_filter_covers_the_whole_subtree() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("tree@example.com").await;
    let expenses = app.category_id(&cookie, "Expenses").await;
    let food = child_category(&app, &cookie, &expenses, "Food").await;
    let groceries = child_category(&app, &cookie, &food, "Groceries").await;

    let market = app
        .send(
            "POST",
            "/api/accounts",
            Some(&cookie),
            Some(json!({ "name": "Market", "categoryId": groceries, "currencyCode": "CNY" })),
        )
        .await;
    assert_eq!(market.status, StatusCode::CREATED, "{}", market.body);
    let market = market.body["data"]["id"].as_str().expect("account id").to_string();
    let rent = app.create_account(&cookie, "Expenses", "Rent", "CNY").await;
    let salary = app.create_account(&cookie, "Income", "Salary", "CNY").await;

    for (account, tx_type, amount) in [(&market, "EXPENSE", "42"), (&rent, "EXPENSE", "900"), (&salary, "INCOME", "5000")] {
        let reply = app
            .send("POST", "/api/transactions", Some(&cookie), Some(tx(account, tx_type, amount, "2026-05-03")))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    }

    for (category, expected) in [(&expenses, 2), (&food, 1), (&groceries, 1)] {
        let list = app
            .send("GET", &format!("/api/transactions?categoryId={category}"), Some(&cookie), None)
            .await;
        assert_eq!(list.status, StatusCode::OK);
        assert_eq!(list.body["data"]["total"], expected, "category {category}");
    }
}

#[tokio::test]
async fn generated_rates_cannot_be_deleted() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("auto@example.com").await;
    app.send("POST", "/api/user/currencies", Some(&cookie), Some(json!({ "code": "USD" })))
        .await;
    let rate = app
        .send(
            "POST",
            "/api/exchange-rates",
            Some(&cookie),
            Some(json!({
                "fromCurrency": "USD",
                "toCurrency": "CNY",
                "rate": "8",
                "effectiveDate": "2026-01-01",
            })),
        )
        .await;
    assert_eq!(rate.status, StatusCode::OK, "{}", rate.body);
    let user_rate = rate.body["data"]["id"].as_str().expect("rate id").to_string();

    let run = app
        .send("POST", "/api/sync/trigger?wait=true", Some(&cookie), None)
        .await;
    assert_eq!(run.body["data"]["state"], "completed", "{}", run.body);

    let rates = app
        .send("GET", "/api/exchange-rates?from=CNY&to=USD", Some(&cookie), None)
        .await;
    let inverse = rates.body["data"]
        .as_array()
        .expect("rate list")
        .iter()
        .find(|r| r["rateType"] == "AUTO")
        .expect("generated inverse")
        .clone();
    assert_eq!(decimal(&inverse["rate"]), dec!(0.125));

    let id = inverse["id"].as_str().expect("rate id");
    let delete = app
        .send("DELETE", &format!("/api/exchange-rates/{id}"), Some(&cookie), None)
        .await;
    assert_eq!(delete.status, StatusCode::CONFLICT);
    assert_eq!(delete.body["error"], "Generated rates are managed by sync");

    let delete = app
        .send("DELETE", &format!("/api/exchange-rates/{user_rate}"), Some(&cookie), None)
        .await;
    assert_eq!(delete.status, StatusCode::OK);
}

#[tokio::test]
async fn cached_reports_follow_ledger_writes() {
    let app = spawn_app(Environment::Test).await;
    let cookie = app.register("cache@example.com").await;
    let cash = app.create_account(&cookie, "Assets", "Cash", "CNY").await;
    let reply = app
        .send("POST", "/api/transactions", Some(&cookie), Some(tx(&cash, "BALANCE", "100", "2026-04-01")))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);

    let uri = "/api/reports/balance-sheet?asOf=2026-04-30";
    let sheet = app.send("GET", uri, Some(&cookie), None).await;
    assert_eq!(decimal(&sheet.body["data"]["totals"]["assets"]), dec!(100));

    let reply = app
        .send("POST", "/api/transactions", Some(&cookie), Some(tx(&cash, "BALANCE", "250", "2026-04-10")))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    let sheet = app.send("GET", uri, Some(&cookie), None).await;
    assert_eq!(decimal(&sheet.body["data"]["totals"]["assets"]), dec!(250));

    // renaming a category shows up in the grouped sections right away
    let assets = app.category_id(&cookie, "Assets").await;
    let rename = app
        .send(
            "PUT",
            &format!("/api/categories/{assets}"),
            Some(&cookie),
            Some(json!({ "name": "Holdings", "type": "ASSET" })),
        )
        .await;
    assert_eq!(rename.status, StatusCode::OK, "{}", rename.body);
    let sheet = app.send("GET", uri, Some(&cookie), None).await;
    let section = sheet.body["data"]["sections"]
        .as_array()
        .expect("sections")
        .iter()
        .find(|s| s["categoryId"] == assets.as_str())
        .expect("assets section")
        .clone();
    assert_eq!(section["categoryName"], "Holdings");
}
