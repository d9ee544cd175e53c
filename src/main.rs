use std::env;
use std::path::Path;

use anyhow::Context;
use saj_sununo_monitor::{validate_setup, MonitorConfig, MonitorCoordinator, MonitorState};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;
    info!("starting SAJ Sununo monitor for {}", config.host);

    let device_info = validate_setup(&config)
        .await
        .context("inverter validation failed")?;
    info!(
        "connected to {} (model {}, serial {}, firmware {})",
        config.device_name, device_info.model, device_info.serial_number, device_info.sw_version
    );

    let mut coordinator = MonitorCoordinator::from_config(&config);
    coordinator
        .first_refresh()
        .await
        .context("initial inverter fetch failed")?;
    coordinator.start();
    info!(
        "polling every {}s, publishing every {}s",
        config.scan_interval_secs, config.storage_interval_secs
    );

    let mut updates = coordinator.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                log_state(&state);
            }
        }
    }

    info!("shutting down");
    coordinator.stop();
    Ok(())
}

/// Loads configuration from the file named by `SAJ_CONFIG`, falling back to
/// the `SAJ_*` environment variables.
fn load_config() -> anyhow::Result<MonitorConfig> {
    match env::var("SAJ_CONFIG") {
        Ok(path) => MonitorConfig::from_json_file(Path::new(&path))
            .with_context(|| format!("failed to load config from {path}")),
        Err(_) => MonitorConfig::from_env().context("failed to load config from environment"),
    }
}

fn log_state(state: &MonitorState) {
    if state.last_update_success {
        match state
            .snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
        {
            Ok(Some(snapshot)) => info!("published snapshot: {snapshot}"),
            Ok(None) => {}
            Err(err) => error!("failed to encode snapshot: {err}"),
        }
    } else {
        let reason = state.last_error.as_deref().unwrap_or("unknown error");
        error!("update failed: {reason}");
    }
}
