//! Sequences detection, installation, server start and model download, and
//! keeps the UI informed.
//!
//! Push: every stage transition goes to the [`StatusSink`].
//! Pull: [`LifecycleOrchestrator::readiness`] re-derives the composite state
//! from the system each time it is called.

use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info};

use super::coalesce::Coalesced;
use super::detector::InstallationDetector;
use super::error::LifecycleError;
use super::installer::RuntimeInstaller;
use super::model::ModelManager;
use super::status::{ModelReadiness, RuntimeReadiness, RuntimeStatus, StatusSink};
use super::supervisor::ServerSupervisor;

type Flow = Coalesced<Result<(), LifecycleError>>;

pub struct LifecycleOrchestrator {
    detector: Arc<InstallationDetector>,
    installer: Arc<RuntimeInstaller>,
    supervisor: Arc<ServerSupervisor>,
    models: Arc<ModelManager>,
    sink: Arc<dyn StatusSink>,
    /// Message of the most recent failed flow, cleared by the next success
    last_error: Mutex<Option<String>>,
    startup: Flow,
    install: Flow,
    download: Flow,
}

impl LifecycleOrchestrator {
    pub fn new(
        detector: Arc<InstallationDetector>,
        installer: Arc<RuntimeInstaller>,
        supervisor: Arc<ServerSupervisor>,
        models: Arc<ModelManager>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            detector,
            installer,
            supervisor,
            models,
            sink,
            last_error: Mutex::new(None),
            startup: Flow::new(),
            install: Flow::new(),
            download: Flow::new(),
        }
    }

    /// Full startup sequence: detect → install → start server → detect model → pull.
    ///
    /// A second call while one is running joins it.
    pub async fn run(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let this = self.clone();
        self.startup
            .run(move || async move {
                let result = this.startup_sequence().await;
                this.finish("Startup", result)
            })
            .await
    }

    /// User requested (re)installation, followed by a server start
    pub async fn install_runtime(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let this = self.clone();
        self.install
            .run(move || async move {
                let result = this.install_sequence().await;
                this.finish("Install", result)
            })
            .await
    }

    /// User requested model download
    pub async fn download_model(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let this = self.clone();
        self.download
            .run(move || async move {
                let result = this.download_sequence().await;
                this.finish("Model download", result)
            })
            .await
    }

    async fn startup_sequence(&self) -> Result<(), LifecycleError> {
        if !self.detector.is_installed().await {
            self.sink
                .status(RuntimeStatus::installing("Installing Ollama..."));
            self.installer.try_install().await?;
        }

        self.sink
            .status(RuntimeStatus::starting("Starting Ollama server..."));
        self.supervisor.ensure_running().await?;

        if !self.models.is_present().await {
            self.announce_download();
            self.models.pull(self.sink.clone()).await?;
        }

        self.sink.status(RuntimeStatus::ready("Ollama is ready"));
        Ok(())
    }

    async fn install_sequence(&self) -> Result<(), LifecycleError> {
        self.sink
            .status(RuntimeStatus::installing("Installing Ollama..."));
        self.installer.try_install().await?;

        self.sink
            .status(RuntimeStatus::starting("Starting Ollama server..."));
        self.supervisor.ensure_running().await?;

        if self.models.is_present().await {
            self.sink.status(RuntimeStatus::ready("Ollama is ready"));
        } else {
            self.sink
                .status(RuntimeStatus::waiting("Model download required"));
        }
        Ok(())
    }

    async fn download_sequence(&self) -> Result<(), LifecycleError> {
        self.supervisor.ensure_running().await?;
        self.announce_download();
        self.models.pull(self.sink.clone()).await?;
        self.sink.status(RuntimeStatus::ready("Model is ready"));
        Ok(())
    }

    fn announce_download(&self) {
        self.sink.status(RuntimeStatus::downloading(format!(
            "Downloading {}...",
            self.models.model_id()
        )));
    }

    /// Turn a failed flow into an error status; remember the outcome
    fn finish(
        &self,
        flow: &str,
        result: Result<(), LifecycleError>,
    ) -> Result<(), LifecycleError> {
        let mut last_error = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        match &result {
            Ok(()) => {
                info!("{} finished", flow);
                *last_error = None;
            }
            Err(e) => {
                error!("{} failed: {}", flow, e);
                *last_error = Some(e.to_string());
                self.sink.status(RuntimeStatus::error(e.to_string()));
            }
        }
        result
    }

    pub fn is_busy(&self) -> bool {
        self.startup.is_running()
            || self.install.is_running()
            || self.download.is_running()
            || self.installer.is_installing()
            || self.supervisor.is_starting()
            || self.models.is_pulling()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn is_installed(&self) -> bool {
        self.detector.is_installed().await
    }

    /// Composite readiness, probed fresh. Never spawns a process.
    pub async fn readiness(&self) -> RuntimeReadiness {
        let installed = self.detector.is_installed().await;
        let server_running = installed && self.supervisor.probe().await;
        let model_ready = server_running && self.models.is_present().await;
        RuntimeReadiness {
            installed,
            server_running,
            model_ready,
            error: if model_ready { None } else { self.last_error() },
        }
    }

    pub async fn model_readiness(&self) -> ModelReadiness {
        let server_running = self.supervisor.probe().await;
        let model_ready = server_running && self.models.is_present().await;
        ModelReadiness {
            model_name: self.models.model_id().to_string(),
            model_ready,
            error: (!server_running).then(|| "Ollama server is not running".to_string()),
        }
    }
}
