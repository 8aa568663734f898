use accruald::config::{AppConfig, LoggingConfig};
use accruald::error::{AccrualError, Result};
use accruald::{HttpAccrualClient, PostgresStore, ReconcilePool, ShutdownController};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "accruald", about = "Loyalty-points order reconciliation daemon")]
struct Cli {
    /// Directory holding default.toml and {ACCRUALD_ENV}.toml
    #[arg(short, long, default_value = "config")]
    config_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config: {e}");
        }
        return Err(AccrualError::Internal("invalid configuration".to_string()));
    }

    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections).await?,
    );
    let client = Arc::new(HttpAccrualClient::new(
        &config.accrual.base_url,
        Duration::from_millis(config.accrual.request_timeout_ms),
    )?);
    let shutdown = Arc::new(ShutdownController::new());

    let pool = Arc::new(ReconcilePool::new(
        client,
        store.clone(),
        config.pool.clone(),
        shutdown.clone(),
    ));

    // Recovery sweep: orders left NEW/PROCESSING by a previous run would
    // otherwise never advance
    let pending = store.pending_orders().await?;
    if !pending.is_empty() {
        info!(count = pending.len(), "re-enqueueing orders pending from a previous run");
        for (login, order_number) in pending {
            pool.append_task(&login, &order_number);
        }
    }

    let runner = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.run_background().await })
    };

    info!(
        accrual_url = %config.accrual.base_url,
        workers = config.pool.concurrency,
        "accruald started"
    );

    shutdown_signal().await;
    shutdown.request_shutdown();

    if tokio::time::timeout(Duration::from_secs(30), shutdown.wait_for_completion())
        .await
        .is_err()
    {
        warn!("shutdown timed out waiting for workers");
    }
    let _ = runner.await;

    info!("accruald stopped");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},accruald=debug,sqlx=warn", config.level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
