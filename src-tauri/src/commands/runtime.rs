use std::sync::Arc;

use tauri::State;

use crate::config::{self, ConfigKey, ConfigStore, RuntimeConfig};
use crate::runtime::{
    CommandOutcome, LifecycleOrchestrator, ModelReadiness, RuntimeReadiness, ServerInfo,
    ServerSupervisor,
};

// ===== RUNTIME STATUS QUERIES =====

#[tauri::command]
#[specta::specta]
pub async fn is_runtime_installed(
    orchestrator: State<'_, Arc<LifecycleOrchestrator>>,
) -> Result<bool, String> {
    Ok(orchestrator.is_installed().await)
}

/// Composite readiness, probed fresh on every call. Read-only: emits no events.
#[tauri::command]
#[specta::specta]
pub async fn check_runtime_status(
    orchestrator: State<'_, Arc<LifecycleOrchestrator>>,
) -> Result<RuntimeReadiness, String> {
    Ok(orchestrator.readiness().await)
}

#[tauri::command]
#[specta::specta]
pub async fn check_model_status(
    orchestrator: State<'_, Arc<LifecycleOrchestrator>>,
) -> Result<ModelReadiness, String> {
    Ok(orchestrator.model_readiness().await)
}

#[tauri::command]
#[specta::specta]
pub async fn get_server_info(
    supervisor: State<'_, Arc<ServerSupervisor>>,
) -> Result<ServerInfo, String> {
    Ok(supervisor.server_info().await)
}

// ===== RUNTIME ACTIONS =====

/// Install the runtime and start its server. Progress arrives as status events.
#[tauri::command]
#[specta::specta]
pub async fn install_runtime(
    orchestrator: State<'_, Arc<LifecycleOrchestrator>>,
) -> Result<CommandOutcome, String> {
    Ok(orchestrator.install_runtime().await.into())
}

/// Pull the required model. Progress arrives as download progress events.
#[tauri::command]
#[specta::specta]
pub async fn download_model(
    orchestrator: State<'_, Arc<LifecycleOrchestrator>>,
) -> Result<CommandOutcome, String> {
    Ok(orchestrator.download_model().await.into())
}

// ===== RUNTIME CONFIGURATION =====

#[tauri::command]
#[specta::specta]
pub fn load_runtime_config(config_store: State<config::Config>) -> Result<RuntimeConfig, String> {
    Ok(config_store.get_or_default(&ConfigKey::RUNTIME))
}

/// Saved settings apply from the next app start
#[tauri::command]
#[specta::specta]
pub fn save_runtime_config(
    config_store: State<config::Config>,
    config: RuntimeConfig,
) -> Result<(), String> {
    if config.model_id.trim().is_empty() {
        return Err("Model id cannot be empty".to_string());
    }
    if reqwest::Url::parse(&config.base_url).is_err() {
        return Err(format!("Invalid runtime URL: {}", config.base_url));
    }
    config_store.set(&ConfigKey::RUNTIME, config)
}
