//! Keeps exactly one healthy Ollama server available.
//!
//! ```text
//! Idle ──> Probing ──healthy──> Verifying ──re-probe ok──> Ready
//!             │                     │
//!         unhealthy          all re-probes fail
//!             └──────> Spawning <───┘
//!                         │
//!          ready marker ──┴── early exit / timeout
//!                 ↓                  ↓
//!               Ready              Failed
//! ```
//!
//! A server found already running is adopted and never stopped by us; only a
//! process this supervisor spawned is killed on shutdown or replacement.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use eodi_signals::{Matcher, RuleTable, StreamFilter};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::coalesce::Coalesced;
use super::detector::InstallationDetector;
use super::error::SupervisorError;
use super::host::{Host, LaunchSpec, ProcessEvent, RunningProcess};
use super::inventory::InventoryClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Idle,
    Probing,
    Verifying,
    Spawning,
    Ready,
    Failed,
}

/// Whether the running server is ours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "lowercase")]
pub enum ServerOrigin {
    Spawned,
    Adopted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub state: SupervisorState,
    pub spawned_pid: Option<u32>,
}

/// Environment passed to `ollama serve`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeTuning {
    pub num_parallel: u32,
    pub max_loaded_models: u32,
    pub flash_attention: bool,
    pub keep_alive: String,
    /// Layers offloaded to the GPU; 999 offloads everything
    pub num_gpu: u32,
    pub load_timeout: String,
    pub gpu_memory_fraction: f64,
    pub max_queue: u32,
    pub context_length: u32,
}

impl Default for RuntimeTuning {
    fn default() -> Self {
        Self {
            num_parallel: 1,
            max_loaded_models: 1,
            flash_attention: true,
            keep_alive: "30m".to_string(),
            num_gpu: 999,
            load_timeout: "10m".to_string(),
            gpu_memory_fraction: 0.9,
            max_queue: 4,
            context_length: 8192,
        }
    }
}

impl RuntimeTuning {
    pub fn to_env(&self) -> Vec<(String, String)> {
        let flag = |on: bool| (if on { "1" } else { "0" }).to_string();
        vec![
            ("OLLAMA_NUM_PARALLEL".into(), self.num_parallel.to_string()),
            ("OLLAMA_MAX_LOADED_MODELS".into(), self.max_loaded_models.to_string()),
            ("OLLAMA_FLASH_ATTENTION".into(), flag(self.flash_attention)),
            ("OLLAMA_KEEP_ALIVE".into(), self.keep_alive.clone()),
            ("OLLAMA_NUM_GPU".into(), self.num_gpu.to_string()),
            ("OLLAMA_LOAD_TIMEOUT".into(), self.load_timeout.clone()),
            ("OLLAMA_GPU_MEMORY_FRACTION".into(), self.gpu_memory_fraction.to_string()),
            ("OLLAMA_MAX_QUEUE".into(), self.max_queue.to_string()),
            ("OLLAMA_CONTEXT_LENGTH".into(), self.context_length.to_string()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub start_timeout: Duration,
    pub verify_attempts: u32,
    pub verify_delay: Duration,
    pub tuning: RuntimeTuning,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(120),
            verify_attempts: 3,
            verify_delay: Duration::from_secs(2),
            tuning: RuntimeTuning::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSignal {
    Ready,
}

/// Readiness marker printed once the server has bound its port
pub fn server_rules() -> RuleTable<ServerSignal> {
    RuleTable::new().signal(
        StreamFilter::Any,
        Matcher::contains_ignore_case("listening on"),
        ServerSignal::Ready,
    )
}

pub struct ServerSupervisor {
    host: Arc<dyn Host>,
    inventory: Arc<dyn InventoryClient>,
    detector: Arc<InstallationDetector>,
    settings: SupervisorSettings,
    rules: RuleTable<ServerSignal>,
    state: Mutex<SupervisorState>,
    /// The one server process we spawned, if any
    tracked: tokio::sync::Mutex<Option<Box<dyn RunningProcess>>>,
    start: Coalesced<Result<ServerOrigin, SupervisorError>>,
}

impl ServerSupervisor {
    pub fn new(
        host: Arc<dyn Host>,
        inventory: Arc<dyn InventoryClient>,
        detector: Arc<InstallationDetector>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            host,
            inventory,
            detector,
            settings,
            rules: server_rules(),
            state: Mutex::new(SupervisorState::Idle),
            tracked: tokio::sync::Mutex::new(None),
            start: Coalesced::new(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SupervisorState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            debug!("Supervisor: {} -> {}", *state, next);
            *state = next;
        }
    }

    pub fn is_starting(&self) -> bool {
        self.start.is_running()
    }

    /// Read-only health check. Never spawns anything.
    pub async fn probe(&self) -> bool {
        match self.inventory.tags().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Ollama probe failed: {}", e);
                false
            }
        }
    }

    pub async fn tracked_pid(&self) -> Option<u32> {
        self.tracked.lock().await.as_ref().and_then(|p| p.id())
    }

    pub async fn server_info(&self) -> ServerInfo {
        ServerInfo {
            state: self.state(),
            spawned_pid: self.tracked_pid().await,
        }
    }

    /// Make sure a verified server is reachable, starting one if needed.
    ///
    /// Concurrent callers join the attempt already in flight.
    pub async fn ensure_running(self: &Arc<Self>) -> Result<ServerOrigin, SupervisorError> {
        let this = self.clone();
        self.start
            .run(move || async move { this.start_inner().await })
            .await
    }

    async fn start_inner(&self) -> Result<ServerOrigin, SupervisorError> {
        self.set_state(SupervisorState::Probing);

        if self.probe().await {
            self.set_state(SupervisorState::Verifying);
            for attempt in 1..=self.settings.verify_attempts {
                tokio::time::sleep(self.settings.verify_delay).await;
                if self.probe().await {
                    let origin = if self.owns_live_process().await {
                        ServerOrigin::Spawned
                    } else {
                        ServerOrigin::Adopted
                    };
                    info!("Ollama server verified on attempt {} ({:?})", attempt, origin);
                    self.set_state(SupervisorState::Ready);
                    return Ok(origin);
                }
                debug!("Verification probe {} failed", attempt);
            }
            warn!("Ollama server answered once but failed verification; starting a new one");
        }

        self.set_state(SupervisorState::Spawning);
        match self.spawn_server().await {
            Ok(()) => {
                self.set_state(SupervisorState::Ready);
                Ok(ServerOrigin::Spawned)
            }
            Err(e) => {
                error!("Failed to start Ollama server: {}", e);
                self.set_state(SupervisorState::Failed);
                Err(e)
            }
        }
    }

    async fn owns_live_process(&self) -> bool {
        self.tracked
            .lock()
            .await
            .as_mut()
            .is_some_and(|process| process.is_running())
    }

    async fn spawn_server(&self) -> Result<(), SupervisorError> {
        if let Some(mut previous) = self.tracked.lock().await.take() {
            info!("Replacing previously spawned server (pid {:?})", previous.id());
            previous.kill().await;
        }

        let program = self.detector.resolve_executable().await;
        let spec = LaunchSpec::new("ollama serve", program)
            .arg("serve")
            .envs(self.settings.tuning.to_env());
        info!("Starting Ollama server: {}", spec.command_line());

        let mut process = self
            .host
            .spawn(&spec)
            .await
            .map_err(|e| SupervisorError::Launch(e.to_string()))?;

        let deadline = Instant::now() + self.settings.start_timeout;
        loop {
            match tokio::time::timeout_at(deadline, process.next_event()).await {
                Ok(ProcessEvent::Output(line)) => {
                    if self.rules.classify(&line).is_some() {
                        info!("Ollama server is ready (pid {:?})", process.id());
                        process.stop_forwarding();
                        *self.tracked.lock().await = Some(process);
                        return Ok(());
                    }
                }
                Ok(ProcessEvent::Exited(code)) => {
                    return Err(SupervisorError::ExitedEarly { code });
                }
                Err(_) => {
                    warn!(
                        "Ollama server not ready after {:?}, killing pid {:?}",
                        self.settings.start_timeout,
                        process.id()
                    );
                    process.kill().await;
                    return Err(SupervisorError::Timeout {
                        secs: self.settings.start_timeout.as_secs(),
                    });
                }
            }
        }
    }

    /// Stop the server if we spawned it. An adopted server keeps running.
    pub async fn shutdown(&self) {
        match self.tracked.lock().await.take() {
            Some(mut process) => {
                info!("Stopping Ollama server (pid {:?})", process.id());
                process.kill().await;
            }
            None => debug!("No spawned Ollama server to stop"),
        }
        self.set_state(SupervisorState::Idle);
    }
}
