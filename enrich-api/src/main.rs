use std::sync::Arc;

use axum::Router;
use common_metrics::{serve, setup_metrics_routes};
use config::Config;
use enrich_common::postgres::PgStore;
use enrich_common::store::RecordStore;
use envconfig::Envconfig;
use eyre::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod config;
mod handlers;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    );
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let config = Config::init_from_env()?;

    let store = PgStore::new(
        &config.database_url,
        config.max_pg_connections,
        config.pg_acquire_timeout.0,
    )
    .await?;
    store.ensure_schema().await?;

    let app = handlers::add_routes(
        Router::new(),
        Arc::new(store),
        config.max_body_size,
        config.concurrency_limit,
    );
    let app = setup_metrics_routes(app).layer(TraceLayer::new_for_http());

    let cancel = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
            cancel.cancel();
        }
    });

    let bind = config.bind();
    let server = serve(app, &bind, {
        let cancel = cancel.clone();
        async move { cancel.cancelled().await }
    });

    // Connections still open this long after the signal are dropped
    let drain_deadline = async {
        cancel.cancelled().await;
        tokio::time::sleep(config.shutdown_timeout.0).await;
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => warn!("shutdown timeout elapsed, dropping open connections"),
    }

    info!("records api shut down");
    Ok(())
}
