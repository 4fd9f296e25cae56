use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alert_api::config::Config;
use alert_api::db::{ClaimStore, LocationIndex, MemoryClaimStore, MemoryLocationIndex, RedisStore};
use alert_api::AppState;

/// How often expired in-memory claims are purged.
const CLAIM_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present; env vars may also be set externally
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let (locations, claims): (Arc<dyn LocationIndex>, Arc<dyn ClaimStore>) = match &config.redis_url {
        Some(url) => {
            let store = Arc::new(RedisStore::connect(url, config.geo_key.clone()).await?);
            tracing::info!(geo_key = %config.geo_key, "using redis location index and claim store");
            let locations: Arc<dyn LocationIndex> = store.clone();
            let claims: Arc<dyn ClaimStore> = store;
            (locations, claims)
        }
        None => {
            let memory_claims = Arc::new(MemoryClaimStore::new());
            spawn_claim_sweeper(memory_claims.clone());
            tracing::info!("REDIS_URL not set, using in-memory location index and claim store");
            let locations: Arc<dyn LocationIndex> = Arc::new(MemoryLocationIndex::new());
            let claims: Arc<dyn ClaimStore> = memory_claims;
            (locations, claims)
        }
    };

    tracing::info!(
        dedup_ttl_secs = config.dedup_ttl.as_secs(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "alert-api configured"
    );

    let state = AppState::new(locations, claims, config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(alert_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "alert-api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn spawn_claim_sweeper(claims: Arc<MemoryClaimStore>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLAIM_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = claims.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "purged expired alert claims");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
