//! Trip planner - conversational trip-planning service
//!
//! Owns trip-planning sessions, validates workflow stage changes, merges
//! generated suggestions and groups activities into days.

mod api;
mod config;
mod dispatch;
mod error;
mod grouping;
mod merge;
mod plan;
mod planner;
mod providers;
mod session;
mod workflow;

use api::{create_router, AppState};
use config::AppConfig;
use planner::Planner;
use providers::SampleTravel;
use session::{spawn_sweeper, InMemorySessionStore, SessionStore, SystemClock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trip_planner=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        port = config.port,
        session_ttl_secs = config.session_ttl.as_secs(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        max_trip_days = config.max_trip_days,
        "Configuration loaded"
    );

    let clock = Arc::new(SystemClock);
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(
        config.session_ttl,
        clock.clone(),
        config.trip_limits(),
    ));

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(store.clone(), config.sweep_interval, cancel.clone());

    let planner = Planner::new(
        store,
        config.text_generator(),
        config.places(),
        Arc::new(SampleTravel),
        clock,
    );
    tracing::info!(model = %planner.model_id(), "Planner ready");
    let state = AppState::new(Arc::new(planner));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(cors).layer(compression);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Trip planner listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            }
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    sweeper.await?;
    Ok(())
}
