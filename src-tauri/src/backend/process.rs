//! Development-mode launcher for the Python video backend.

use std::sync::Arc;
use std::time::Duration;

use eodi_signals::{Matcher, RuleTable, StreamFilter};
use log::{info, warn};
use tokio::sync::Mutex;

use super::error::BackendError;
use crate::config::BackendConfig;
use crate::runtime::error::exit_label;
use crate::runtime::host::{Host, LaunchSpec, ProcessEvent, RunningProcess};

const START_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendReady;

/// Uvicorn startup markers
pub fn backend_rules() -> RuleTable<BackendReady> {
    RuleTable::new()
        .signal(StreamFilter::Any, Matcher::contains("Uvicorn running on"), BackendReady)
        .signal(
            StreamFilter::Any,
            Matcher::contains("Application startup complete"),
            BackendReady,
        )
}

/// Build the uvicorn command line from the backend configuration
pub fn launch_spec(config: &BackendConfig) -> Result<LaunchSpec, BackendError> {
    let url = reqwest::Url::parse(&config.base_url)
        .map_err(|e| BackendError::Launch(format!("{}: {}", config.base_url, e)))?;
    let host = url.host_str().unwrap_or("127.0.0.1").to_string();
    let port = url.port_or_known_default().unwrap_or(8000).to_string();

    let mut spec = LaunchSpec::new("backend", config.python.as_str()).args([
        "-m",
        "uvicorn",
        "main:app",
        "--host",
        host.as_str(),
        "--port",
        port.as_str(),
    ]);
    if let Some(dir) = &config.directory {
        spec = spec.current_dir(dir);
    }
    Ok(spec)
}

/// The backend process we started, if any
pub struct BackendProcess {
    host: Arc<dyn Host>,
    rules: RuleTable<BackendReady>,
    process: Mutex<Option<Box<dyn RunningProcess>>>,
}

impl BackendProcess {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            rules: backend_rules(),
            process: Mutex::new(None),
        }
    }

    /// Spawn the backend and wait for uvicorn to report it is serving
    pub async fn start(&self, config: &BackendConfig) -> Result<(), BackendError> {
        let mut slot = self.process.lock().await;
        if slot.as_mut().is_some_and(|p| p.is_running()) {
            return Ok(());
        }

        let spec = launch_spec(config)?;
        info!("Starting backend: {}", spec.command_line());
        let mut process = self
            .host
            .spawn(&spec)
            .await
            .map_err(|e| BackendError::Launch(e.to_string()))?;

        let deadline = tokio::time::Instant::now() + START_TIMEOUT;
        loop {
            match tokio::time::timeout_at(deadline, process.next_event()).await {
                Ok(ProcessEvent::Output(line)) => {
                    if self.rules.classify(&line).is_some() {
                        info!("Backend is ready (pid {:?})", process.id());
                        process.stop_forwarding();
                        *slot = Some(process);
                        return Ok(());
                    }
                }
                Ok(ProcessEvent::Exited(code)) => {
                    return Err(BackendError::Launch(format!(
                        "backend exited before it was ready ({})",
                        exit_label(&code)
                    )));
                }
                Err(_) => {
                    process.kill().await;
                    return Err(BackendError::Launch(format!(
                        "backend not ready after {:?}",
                        START_TIMEOUT
                    )));
                }
            }
        }
    }

    pub async fn stop(&self) {
        if let Some(mut process) = self.process.lock().await.take() {
            info!("Stopping backend (pid {:?})", process.id());
            process.kill().await;
        }
    }
}

/// Start the backend in the background, logging instead of failing
pub fn start_in_background(backend: Arc<BackendProcess>, config: BackendConfig) {
    tauri::async_runtime::spawn(async move {
        if let Err(e) = backend.start(&config).await {
            warn!("{}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{FakeHost, FakeScript};

    fn config() -> BackendConfig {
        BackendConfig {
            base_url: "http://127.0.0.1:8000".into(),
            directory: Some("/srv/backend".into()),
            python: "python3".into(),
        }
    }

    #[test]
    fn launch_spec_targets_configured_address() {
        let spec = launch_spec(&config()).unwrap();
        assert_eq!(
            spec.command_line(),
            "python3 -m uvicorn main:app --host 127.0.0.1 --port 8000"
        );
        assert_eq!(spec.current_dir.as_deref(), Some(std::path::Path::new("/srv/backend")));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = BackendConfig {
            base_url: "not a url".into(),
            ..config()
        };
        assert!(matches!(launch_spec(&config), Err(BackendError::Launch(_))));
    }

    #[tokio::test]
    async fn start_waits_for_uvicorn_then_stop_kills_it() {
        let host = Arc::new(FakeHost::new().script(
            FakeScript::new()
                .stderr("INFO:     Started server process [4242]")
                .stderr("INFO:     Uvicorn running on http://127.0.0.1:8000 (Press CTRL+C to quit)")
                .hang(),
        ));
        let backend = BackendProcess::new(host.clone());

        backend.start(&config()).await.unwrap();
        assert!(!host.was_killed(0));

        // already running: no second process
        backend.start(&config()).await.unwrap();
        assert_eq!(host.spawn_count(), 1);

        backend.stop().await;
        assert!(host.was_killed(0));

        // stdout marker works too, and a second stop is a no-op
        let host = Arc::new(FakeHost::new().script(
            FakeScript::new()
                .stdout("INFO:     Application startup complete.")
                .hang(),
        ));
        let backend = BackendProcess::new(host.clone());
        backend.start(&config()).await.unwrap();
        backend.stop().await;
        backend.stop().await;
        assert_eq!(host.spawn_count(), 1);
    }

    #[tokio::test]
    async fn crash_before_ready_is_an_error() {
        let host = Arc::new(FakeHost::new().script(
            FakeScript::new()
                .stderr("ModuleNotFoundError: No module named 'uvicorn'")
                .exit(1),
        ));
        let backend = BackendProcess::new(host);
        assert!(matches!(
            backend.start(&config()).await,
            Err(BackendError::Launch(_))
        ));
    }
}
