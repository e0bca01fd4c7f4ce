use std::sync::Arc;

use dicebot_common::config::AppConfig;
use dicebot_common::db;
use dicebot_notifier::listener::TelegramListener;
use dicebot_notifier::telegram::TelegramClient;
use dicebot_worker::lifecycle::{Worker, WorkerSettings};
use dicebot_worker::store::PgRequestStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dicebot_worker=info,dicebot_notifier=info,dicebot_common=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("Dicebot worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let settings = WorkerSettings::from(&config);

    // Connect to database
    let pool = db::create_pool(&config).await?;
    let store = Arc::new(PgRequestStore::new(pool));

    let channel = Arc::new(TelegramClient::new(
        &config.telegram_api_url,
        &config.telegram_bot_token,
    )?);

    // Connectivity checks run before any cycle or listener starts
    let worker = Worker::start(store, Arc::clone(&channel), settings)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Fatal startup failure"))?;

    let listener = TelegramListener::new(channel.as_ref().clone(), settings.source).spawn();
    let worker = Arc::new(worker.with_listener(listener));

    tracing::info!(source = %settings.source, "Dicebot worker running");

    shutdown_signal().await;
    tracing::info!("Received shutdown signal, stopping gracefully...");

    // A repeated signal during shutdown is absorbed by the idempotent shutdown
    let repeat = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            shutdown_signal().await;
            worker.shutdown().await;
        })
    };
    worker.shutdown().await;
    repeat.abort();

    tracing::info!("Dicebot worker stopped.");
    Ok(())
}

/// Resolve on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
