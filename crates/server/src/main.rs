//! Service entry point

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use memsearch_config::{load_settings, Settings};
use memsearch_core::{LanguageModel, StatusPublisher};
use memsearch_indexing::{
    BatchConfig, ConsumerConfig, NatsStatusPublisher, TurnFinalizedConsumer, TurnsIndexer,
    TurnsIndexerConfig,
};
use memsearch_llm::{AnthropicBackend, AnthropicConfig};
use memsearch_retrieval::{QdrantStore, StoreConfig};
use memsearch_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env} > config/default > defaults
    let env = std::env::var("MEMSEARCH_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting memsearch");

    let _metrics_handle = init_metrics();
    tracing::info!("Initialized Prometheus metrics at /metrics");

    // Vector store
    let store = Arc::new(QdrantStore::new(StoreConfig::from_settings(
        &settings.qdrant,
        settings.embedder.dense_dim,
    ))?);
    if let Err(e) = store.ensure_collections().await {
        tracing::warn!(error = %e, "Could not ensure collections; continuing");
    }

    // Optional LLM backend (query expansion, llm reranker tier)
    let llm: Option<Arc<dyn LanguageModel>> =
        match AnthropicBackend::new(AnthropicConfig::from(&settings.llm)) {
            Ok(backend) => Some(Arc::new(backend)),
            Err(e) => {
                tracing::warn!(error = %e, "LLM backend disabled");
                None
            }
        };

    let state = AppState::new(settings.clone(), store.clone(), llm);

    if settings.embedder.preload {
        state.embedders.preload().await?;
    }

    // Stream consumer for turn-finalized events
    let consumer_handle = if settings.nats.enabled {
        Some(start_consumer(&settings, &state).await?)
    } else {
        tracing::info!("Stream consumer disabled");
        None
    };

    let addr: SocketAddr = format!(
        "{}:{}",
        settings.server.host, settings.server.port
    )
    .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((consumer, handle)) = consumer_handle {
        tracing::info!("Stopping stream consumer");
        consumer.stop();
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn start_consumer(
    settings: &Settings,
    state: &AppState,
) -> anyhow::Result<(Arc<TurnFinalizedConsumer>, tokio::task::JoinHandle<()>)> {
    let client = async_nats::connect(&settings.nats.url).await?;
    tracing::info!(url = %settings.nats.url, "Connected to NATS");

    let indexer = Arc::new(TurnsIndexer::new(
        state.store.clone(),
        state.embedders.clone(),
        TurnsIndexerConfig {
            collection_name: settings.qdrant.turn_collection.clone(),
            enable_sparse: settings.embedder.enable_sparse,
            enable_colbert: settings.embedder.enable_colbert,
            ..Default::default()
        },
    ));

    let status: Arc<dyn StatusPublisher> = Arc::new(NatsStatusPublisher::new(
        client.clone(),
        settings.nats.status_subject.clone(),
    ));

    let consumer = Arc::new(TurnFinalizedConsumer::new(
        client,
        indexer,
        Some(status),
        ConsumerConfig {
            subject: settings.nats.subject.clone(),
            group_id: settings.nats.group_id.clone(),
            heartbeat_interval_ms: settings.nats.heartbeat_interval_ms,
            batch: BatchConfig {
                batch_size: settings.indexing.batch_size,
                flush_interval_ms: settings.indexing.flush_interval_ms,
                max_queue_size: settings.indexing.max_queue_size,
            },
            ..Default::default()
        },
    ));

    let runner = Arc::clone(&consumer);
    let handle = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            tracing::error!(error = %e, "Stream consumer exited with error");
        }
    });

    Ok((consumer, handle))
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("memsearch={},tower_http=info", settings.logging.level).into()
    });

    let fmt_layer = if settings.logging.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl-c"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
