use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use campaigner::config::Config;
use campaigner::delivery::console::ConsoleDelivery;
use campaigner::queue::manager::QueueManager;
use campaigner::store::memory::MemoryStore;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config = Config::from_env().expect("Failed to load configuration");

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!("Starting campaigner");

    // Hosted deployments wire in their own store and delivery adapters; the
    // bundled in-memory store and console delivery make a local run
    // self-contained.
    let store = Arc::new(MemoryStore::new());
    let delivery = Arc::new(ConsoleDelivery::new());
    let state = campaigner::build_state(store, delivery, config);

    let mut manager = QueueManager::new(state);
    manager.start();

    // Thin control shell: `start`, `stop` and `status` on stdin, SIGTERM for
    // graceful shutdown.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = shutdown_signal() => {
                tracing::info!("Stopping queue because of shutdown signal");
                break;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                match line.trim() {
                    "stop" => {
                        if manager.is_running() {
                            if let Err(e) = manager.stop().await {
                                tracing::error!("Error stopping queue: {e}");
                            }
                        } else {
                            println!("Already stopped");
                        }
                    }
                    "start" => {
                        if manager.is_running() {
                            println!("Already running");
                        } else {
                            manager.start();
                        }
                    }
                    "status" => {
                        println!(
                            "{}",
                            if manager.is_running() { "running" } else { "stopped" }
                        );
                    }
                    "" => {}
                    other => println!("Unknown command: {other}"),
                }
            }
        }
    }

    if manager.is_running() {
        match manager.stop().await {
            Ok(()) => tracing::info!("Queue stopped"),
            Err(e) => tracing::error!("Error stopping queue: {e}"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
