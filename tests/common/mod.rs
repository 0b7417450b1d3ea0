#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use ledgerflow::config::{Config, Environment};
use ledgerflow::db::Storage;
use ledgerflow::router::report_cache;
use ledgerflow::service::fx_provider::FxProvider;
use ledgerflow::service::sync_actor;
use ledgerflow::{LedgerState, ledger_router};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;
use url::Url;

pub struct TestApp {
    pub router: Router,
    pub storage: Storage,
    _dir: TempDir,
}

pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
    pub set_cookie: Option<String>,
}

pub fn test_config(environment: Environment) -> Config {
    let mut cfg = Config::default();
    cfg.basic.environment = environment;
    cfg.basic.insecure_cookie = true;
    cfg.basic.cookie_secret = "integration-test-secret-integration-test-secret-0123456789".to_string();
    cfg.sync.sweep_interval_secs = 0;
    cfg
}

pub async fn spawn_app(environment: Environment) -> TestApp {
    spawn_app_with(test_config(environment)).await
}

/// Start the app from `cfg` on a fresh database in a temp dir.
pub async fn spawn_app_with(mut cfg: Config) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    cfg.basic.database_url = format!("sqlite://{}", dir.path().join("ledger.db").display());

    let storage = ledgerflow::db::connect(&cfg.basic.database_url)
        .await
        .expect("connect sqlite");
    let config = Arc::new(cfg);
    let cache = report_cache(&config);
    let provider = FxProvider::from_config(&config.fx).expect("fx provider");
    let sync = sync_actor::spawn(storage.clone(), &config.sync, provider, cache.clone())
        .await
        .expect("spawn sync actor");
    let state = LedgerState::new(storage.clone(), sync, cache, config);

    TestApp {
        router: ledger_router(state),
        storage,
        _dir: dir,
    }
}

/// A rate endpoint that accepts connections and never answers, keeping a sync run in flight.
pub async fn silent_rate_endpoint() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    Url::parse(&format!("http://{addr}/latest/{{base}}")).expect("provider url")
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => req.body(Body::empty()),
        }
        .expect("request");

        let resp = self.router.clone().oneshot(req).await.expect("response");
        let status = resp.status();
        let set_cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        Reply {
            status,
            body,
            set_cookie,
        }
    }

    /// Register a user and return the `name=value` pair of its session cookie.
    pub async fn register(&self, email: &str) -> String {
        self.register_user(email).await.0
    }

    /// Register a user and return its session cookie pair and user id.
    pub async fn register_user(&self, email: &str) -> (String, String) {
        let reply = self
            .send(
                "POST",
                "/api/auth/register",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "name": "Test User",
                    "password": "correct-horse-battery",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        let user_id = reply.body["data"]["id"].as_str().expect("user id").to_string();
        let cookie = cookie_pair(reply.set_cookie.as_deref().expect("session cookie"));
        (cookie, user_id)
    }

    /// Id of the user's top-level category with the given name.
    pub async fn category_id(&self, cookie: &str, name: &str) -> String {
        let reply = self.send("GET", "/api/categories", Some(cookie), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.body["data"]
            .as_array()
            .expect("category list")
            .iter()
            .find(|c| c["name"] == name)
            .and_then(|c| c["id"].as_str())
            .expect("category present")
            .to_string()
    }

    pub async fn create_account(&self, cookie: &str, category: &str, name: &str, currency: &str) -> String {
        let category_id = self.category_id(cookie, category).await;
        let reply = self
            .send(
                "POST",
                "/api/accounts",
                Some(cookie),
                Some(serde_json::json!({
                    "name": name,
                    "categoryId": category_id,
                    "currencyCode": currency,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.body["data"]["id"].as_str().expect("account id").to_string()
    }
}

pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().trim().to_string()
}
