//! Lifecycle management for the local Ollama runtime.
//!
//! Leaf to root: [`platform`] → [`detector`] → [`installer`] →
//! [`supervisor`] → [`model`] → [`orchestrator`]. All process and network
//! access goes through [`host::Host`] and [`inventory::InventoryClient`].

pub mod coalesce;
pub mod detector;
pub mod error;
pub mod host;
pub mod installer;
pub mod inventory;
pub mod model;
pub mod orchestrator;
pub mod platform;
pub mod status;
pub mod supervisor;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

pub use detector::InstallationDetector;
pub use error::{InstallError, LifecycleError, PullError, SupervisorError};
pub use installer::{InstallPlan, RuntimeInstaller};
pub use model::ModelManager;
pub use orchestrator::LifecycleOrchestrator;
pub use platform::PlatformPaths;
pub use status::{
    AppStatusSink, CommandOutcome, DownloadProgress, ModelReadiness, RuntimeReadiness,
    RuntimeStatus, StatusSink,
};
pub use supervisor::{ServerInfo, ServerSupervisor, SupervisorSettings};

use host::Host;
use inventory::InventoryClient;

/// The runtime components wired together once at startup
#[derive(Clone)]
pub struct RuntimeServices {
    pub supervisor: Arc<ServerSupervisor>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
}

impl RuntimeServices {
    pub fn new(
        host: Arc<dyn Host>,
        inventory: Arc<dyn InventoryClient>,
        paths: PlatformPaths,
        model_id: &str,
        settings: SupervisorSettings,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let installer = Arc::new(RuntimeInstaller::new(
            host.clone(),
            InstallPlan::for_platform(&paths),
        ));
        let detector = Arc::new(InstallationDetector::new(host.clone(), paths));
        let supervisor = Arc::new(ServerSupervisor::new(
            host.clone(),
            inventory.clone(),
            detector.clone(),
            settings,
        ));
        let models = Arc::new(ModelManager::new(
            host,
            inventory,
            detector.clone(),
            model_id,
        ));
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            detector,
            installer,
            supervisor.clone(),
            models,
            sink,
        ));

        Self {
            supervisor,
            orchestrator,
        }
    }
}
