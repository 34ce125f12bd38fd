use crate::{
    backend::{process, BackendClient, BackendProcess},
    config::{self, AppEnv, Config, ConfigKey, ConfigStore},
    error::Error,
    runtime::{
        host::{Host, SystemHost},
        inventory::HttpInventory,
        AppStatusSink, LifecycleOrchestrator, PlatformPaths, RuntimeServices, RuntimeStatus,
        ServerSupervisor, StatusSink,
    },
};
use log::{info, warn};
use std::sync::Arc;
use tauri::Manager;
use tauri_plugin_store::StoreExt;

pub fn setup_app(app: &mut tauri::App<tauri::Wry>) -> Result<(), Error> {
    info!("EODI v{}", env!("CARGO_PKG_VERSION"));

    let env = AppEnv::from_env();
    if env.dev_mode {
        info!("Running in development mode");
    }

    let store = app.store(config::STORE_FILE)?;
    let config_store = Config::new(store);
    let runtime_config = config_store.get_or_default(&ConfigKey::RUNTIME);
    let backend_config = config_store.get_or_default(&ConfigKey::BACKEND);

    let paths = PlatformPaths::current();
    info!(
        "Platform {}: install path {}",
        paths.os,
        paths.install_path.display()
    );

    let host: Arc<dyn Host> = Arc::new(SystemHost);
    let inventory = Arc::new(HttpInventory::new(&runtime_config.base_url)?);
    let sink: Arc<dyn StatusSink> = Arc::new(AppStatusSink::new(app.handle().clone()));
    let services = RuntimeServices::new(
        host.clone(),
        inventory,
        paths,
        &runtime_config.model_id,
        runtime_config.supervisor_settings(),
        sink.clone(),
    );

    let backend_client = Arc::new(BackendClient::new(&backend_config.base_url)?);
    info!("Video backend at {}", backend_client.base_url());
    let backend_process = Arc::new(BackendProcess::new(host));

    app.manage(config_store);
    app.manage(env);
    app.manage(services.orchestrator.clone());
    app.manage(services.supervisor.clone());
    app.manage(backend_client);
    app.manage(backend_process.clone());

    if env.dev_mode {
        process::start_in_background(backend_process, backend_config);

        #[cfg(debug_assertions)]
        if let Some(window) = app.get_webview_window("main") {
            window.open_devtools();
        }
    }

    // The webview asks for the readiness projection on load, so a missed
    // early event only costs a redundant check.
    sink.status(RuntimeStatus::checking("Checking Ollama installation..."));
    let orchestrator = services.orchestrator;
    tauri::async_runtime::spawn(async move {
        if orchestrator.run().await.is_err() {
            warn!("Startup did not reach a ready runtime");
        }
    });

    Ok(())
}

/// Stops the processes this session started. An adopted Ollama server keeps running.
pub fn shutdown(app: &tauri::AppHandle) {
    let supervisor = app
        .try_state::<Arc<ServerSupervisor>>()
        .map(|s| s.inner().clone());
    let backend = app
        .try_state::<Arc<BackendProcess>>()
        .map(|s| s.inner().clone());
    let busy = app
        .try_state::<Arc<LifecycleOrchestrator>>()
        .is_some_and(|o| o.is_busy());
    if busy {
        info!("Exiting while a runtime flow is in progress");
    }

    tauri::async_runtime::block_on(async move {
        if let Some(supervisor) = supervisor {
            supervisor.shutdown().await;
        }
        if let Some(backend) = backend {
            backend.stop().await;
        }
    });
    info!("Shutdown complete");
}
