//! OHLCV Ingestor Binary
//!
//! Starts the kline ingest pipeline: N symbol-partitioned workers, each
//! owning a dedup window, a batch accumulator, and a store handle, fed
//! by newline-delimited envelopes on stdin (the in-process stand-in for
//! the bus consumer; any transport that can write one raw envelope per
//! line can drive this binary).
//!
//! # Usage
//!
//! ```bash
//! some-feed-tap | cargo run -p ohlcv-ingestor
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `OHLCV_DATABASE_URL`: PostgreSQL connection string
//!
//! ## Optional
//! - `OHLCV_WORKERS`: pipeline workers (default: 1)
//! - `OHLCV_BATCH_MAX_SIZE`: flush threshold in records (default: 200)
//! - `OHLCV_BATCH_MAX_AGE_MS`: flush threshold in ms (default: 2000)
//! - `OHLCV_COMMIT_TIMEOUT_SECS`: commit I/O bound (default: 10)
//! - `OHLCV_COMMIT_MAX_ATTEMPTS`: commit retries incl. first (default: 5)
//! - `OHLCV_DEDUP_WINDOW_SECS`: fingerprint retention (default: 3600)
//! - `OHLCV_HEALTH_PORT`: health/metrics HTTP port (default: 8083)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use ohlcv_ingestor::infrastructure::telemetry;
use ohlcv_ingestor::{
    CandleStore, ChannelEnvelopeSource, EnvelopeDispatcher, EnvelopeSource, HealthServer,
    HealthServerState, NdjsonEnvelopeSource, PipelineConfig, PipelineError, PipelineOptions,
    PipelineWorker, PostgresCandleStore, init_metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();
    let _metrics_handle = init_metrics();

    tracing::info!("Starting OHLCV ingestor");

    let config = PipelineConfig::from_env().context("configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        config.workers,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        Arc::clone(&health_state),
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "health server error");
        }
    });

    // Durable sink: one pool, one handle per worker. Each in-flight
    // transaction owns its connection exclusively.
    let store = PostgresCandleStore::connect(
        &config.database_url,
        config.workers as u32 + 1,
        config.commit.timeout,
    )
    .await
    .context("connecting to destination store")?;
    store.ensure_schema().await;

    // Pipeline workers, one envelope channel each. The routing key is
    // the symbol; it must match the upstream transport's partitioning.
    let options = PipelineOptions {
        dedup_window: config.dedup_window,
        batch_max_size: config.batch.max_size,
        batch_max_age: config.batch.max_age,
        retry: config.commit.retry.clone(),
    };

    let mut workers: JoinSet<Result<(), PipelineError>> = JoinSet::new();
    let mut senders = Vec::with_capacity(config.workers);
    for id in 0..config.workers {
        let (tx, rx) = mpsc::channel(config.source.channel_capacity);
        senders.push(tx);
        let worker = PipelineWorker::new(
            id,
            ChannelEnvelopeSource::new(rx),
            store.clone(),
            &options,
            shutdown_token.clone(),
        );
        workers.spawn(worker.run());
    }

    // Feed stdin envelopes through the symbol-partition dispatcher.
    // Dropping the dispatcher at EOF closes the worker channels, which
    // drains and stops the workers.
    let dispatcher = EnvelopeDispatcher::new(senders);
    tokio::spawn(async move {
        let mut source = NdjsonEnvelopeSource::new(tokio::io::stdin());
        while let Some(envelope) = source.next().await {
            if !dispatcher.dispatch(envelope).await {
                tracing::warn!("worker channel closed, stopping feed");
                break;
            }
        }
        tracing::info!("envelope feed ended");
    });

    health_state.set_ready();
    tracing::info!("pipeline ready");

    let mut fatal: Option<PipelineError> = None;

    tokio::select! {
        () = await_signal() => {
            tracing::info!("shutdown signal received, draining workers");
        }
        Some(first) = workers.join_next() => {
            fatal = collect_worker_result(first);
        }
    }

    health_state.set_stopping();
    shutdown_token.cancel();

    while let Some(result) = workers.join_next().await {
        if let Some(err) = collect_worker_result(result) {
            fatal.get_or_insert(err);
        }
    }

    tracing::info!("OHLCV ingestor stopped");

    match fatal {
        // Exhausted commit retries must page an operator, not exit clean.
        Some(err) => Err(anyhow::Error::new(err).context("pipeline failed")),
        None => Ok(()),
    }
}

/// Unpack a worker join result, logging and returning fatal errors.
fn collect_worker_result(
    result: Result<Result<(), PipelineError>, tokio::task::JoinError>,
) -> Option<PipelineError> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "pipeline worker failed");
            Some(err)
        }
        Err(join_err) => {
            tracing::error!(error = %join_err, "pipeline worker panicked");
            None
        }
    }
}

/// Load .env from the current directory or any ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &PipelineConfig) {
    tracing::info!(
        workers = config.workers,
        batch_max_size = config.batch.max_size,
        batch_max_age_ms = config.batch.max_age.as_millis() as u64,
        commit_timeout_secs = config.commit.timeout.as_secs(),
        commit_max_attempts = config.commit.retry.max_attempts,
        dedup_window_secs = config.dedup_window.as_secs(),
        health_port = config.server.health_port,
        source_topic = %config.source.topic,
        "Configuration loaded"
    );
}

/// Wait for SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn await_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
