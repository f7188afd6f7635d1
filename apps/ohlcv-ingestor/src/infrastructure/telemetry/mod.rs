//! Tracing Initialization
//!
//! Structured logging via `tracing` with an `EnvFilter`. The default
//! directive keeps the pipeline at `info`; override with `RUST_LOG`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVES: &str = "info,ohlcv_ingestor=info,sqlx=warn";

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored so tests can
/// initialize independently.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        tracing::info!("telemetry initialized twice without panicking");
    }
}
