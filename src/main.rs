use std::path::PathBuf;
use std::sync::Arc;

use amg_telemetry_bridge_lib::commands::run_console;
use amg_telemetry_bridge_lib::config::AppConfig;
use amg_telemetry_bridge_lib::core::bluetooth::BluestTransport;
use amg_telemetry_bridge_lib::logging::ConsoleLogger;
use amg_telemetry_bridge_lib::state::AppState;
use log::{error, info, LevelFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logs = match ConsoleLogger::init(LevelFilter::Info) {
        Ok(history) => Some(history),
        Err(e) => {
            eprintln!("Failed to install logger: {}", e);
            None
        }
    };

    let config_path = AppConfig::resolve_path(std::env::args_os().nth(1).map(PathBuf::from));
    let config = AppConfig::load_config(&config_path).await?;

    info!("Starting AppState initialization.");
    let transport = Arc::new(BluestTransport::new(config.link.min_rssi).await?);
    let state = AppState::new(config, transport, logs);
    let tasks = state.spawn_background_tasks();

    tokio::select! {
        result = run_console(&state) => {
            if let Err(e) = result {
                error!("Console stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received."),
    }

    state.shutdown().await;
    for task in tasks {
        if let Err(e) = task.await {
            error!("Background task ended abnormally: {}", e);
        }
    }
    Ok(())
}
