//! `sical-worker` -- dispatches pending SICAL jobs to the executor.
//!
//! Reads job files from `$SICAL_INPUT_DIR/pending_files`, sends each
//! operation to the executor over RabbitMQ, and moves every job to
//! `processed_files`, `partial` or `failed` with a `_results.json`
//! companion. See [`WorkerConfig::from_env`] for the environment variables.

use anyhow::Context;
use sical_broker::AmqpTransport;
use sical_store::JobStore;
use sical_worker::{JobRunner, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sical_worker=info,sical_broker=info,sical_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    tracing::info!(
        input_dir = %config.input_dir.display(),
        broker = %config.broker.redacted_uri(),
        reply_timeout_secs = config.dispatch.reply_timeout.as_secs(),
        poll_interval_secs = config.poll_interval.map(|d| d.as_secs()),
        "Starting sical-worker",
    );

    let store = JobStore::open(config.areas()).context("Failed to prepare job directories")?;

    let broker = config.broker.clone();
    let mut runner = JobRunner::new(store, config.dispatch.clone(), move || {
        AmqpTransport::new(broker.clone())
    });

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            ctrl_c_cancel.cancel();
        }
    });

    runner
        .run(config.poll_interval, cancel)
        .await
        .context("Failed to scan pending jobs")?;

    tracing::info!("sical-worker finished");
    Ok(())
}
