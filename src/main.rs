use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &ledgerflow::config::CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        environment = ?cfg.basic.environment,
        fx_provider = %cfg.fx.provider_url.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.basic.loglevel,
    );
    if cfg.basic.insecure_cookie {
        warn!("session cookie is sent without the Secure flag");
    }

    let storage = ledgerflow::db::connect(&cfg.basic.database_url).await?;
    let provider = ledgerflow::service::fx_provider::FxProvider::from_config(&cfg.fx)?;
    let config = Arc::new((**cfg).clone());
    let cache = ledgerflow::router::report_cache(&config);
    let sync =
        ledgerflow::service::sync_actor::spawn(storage.clone(), &config.sync, provider, cache.clone())
            .await?;

    let state = ledgerflow::LedgerState::new(storage, sync, cache, config.clone());
    let app = ledgerflow::ledger_router(state);

    let listener = TcpListener::bind(&config.basic.listen_addr).await?;
    info!("HTTP server listening on {}", config.basic.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
