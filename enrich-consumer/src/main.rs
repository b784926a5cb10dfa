//! Consume identity records from Kafka, enrich them and store them in Postgres.
use std::future::ready;
use std::sync::Arc;

use axum::{routing::get, Router};
use common_kafka::consumer::SingleTopicConsumer;
use common_kafka::context::KafkaContext;
use common_metrics::{serve, setup_metrics_routes};
use enrich_common::postgres::PgStore;
use enrich_common::store::RecordStore;
use enrich_consumer::config::Config;
use enrich_consumer::dead_letter::KafkaDeadLetterRouter;
use enrich_consumer::lookup::EnrichmentClient;
use enrich_consumer::pipeline::{Pipeline, PipelineConfig};
use enrich_consumer::validator::Validator;
use health::HealthRegistry;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() -> Result<(), anyhow::Error> {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
            .add_directive("rdkafka=warn".parse()?),
    );
    tracing_subscriber::registry().with(log_layer).init();
    Ok(())
}

pub async fn index() -> &'static str {
    "enrichment consumer"
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    setup_tracing()?;
    info!("Starting enrichment consumer...");

    let config = Config::init_with_defaults()?;
    info!(
        topic = %config.consumer.kafka_consumer_topic,
        group_id = %config.consumer.kafka_consumer_group,
        dead_letter_topic = config.dead_letter_topic.as_str(),
        alphabet = %config.name_alphabet,
        "Configuration loaded"
    );

    let liveness = HealthRegistry::new("liveness");
    let pipeline_liveness = liveness.register("pipeline", time::Duration::seconds(30));
    let kafka_liveness = liveness.register("kafka", time::Duration::seconds(30));

    let store = PgStore::new(
        &config.database_url,
        config.max_pg_connections,
        config.store_timeout.0,
    )
    .await?;
    store.ensure_schema().await?;

    let consumer = SingleTopicConsumer::new(
        &config.kafka,
        &config.consumer,
        KafkaContext::from(kafka_liveness),
    )?;

    let enricher = EnrichmentClient::new(
        &config.age_api_url,
        &config.gender_api_url,
        &config.nationality_api_url,
        config.enrichment_timeout.0,
    )?;

    let router =
        KafkaDeadLetterRouter::new(config.kafka.clone(), config.dead_letter_topic.as_str());

    let pipeline = Pipeline::new(
        Arc::new(consumer),
        Validator::new(config.name_alphabet)?,
        Arc::new(enricher),
        Arc::new(router),
        Arc::new(store),
        PipelineConfig::from(&config),
        pipeline_liveness,
    );

    // Shutdown signal
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

    // Health check server
    let bind = config.bind();
    let health_router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())));
    let health_router = setup_metrics_routes(health_router);

    let server = tokio::spawn({
        let cancel = cancel.clone();
        async move { serve(health_router, &bind, async move { cancel.cancelled().await }).await }
    });

    let result = pipeline.run(cancel.clone()).await;
    cancel.cancel();
    server.await??;
    result?;

    info!("Enrichment consumer shut down");
    Ok(())
}
