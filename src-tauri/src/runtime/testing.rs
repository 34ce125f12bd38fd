//! Scripted stand-ins for the OS, the inventory endpoint and the UI.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eodi_signals::OutputLine;

use super::host::{CommandOutput, Host, LaunchSpec, ProcessEvent, RunningProcess};
use super::inventory::{InventoryClient, InventoryError};
use super::status::{DownloadProgress, RuntimeStatus, StatusKind, StatusSink};

/// What a fake child process prints and how it ends
#[derive(Debug, Clone, Default)]
pub struct FakeScript {
    delay: Duration,
    lines: Vec<OutputLine>,
    exit: Option<i32>,
    hang: bool,
}

impl FakeScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause before every line
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn stdout(mut self, text: &str) -> Self {
        self.lines.push(OutputLine::stdout(text));
        self
    }

    pub fn stderr(mut self, text: &str) -> Self {
        self.lines.push(OutputLine::stderr(text));
        self
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.exit = Some(code);
        self.hang = false;
        self
    }

    /// Keep running after the last line until killed
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[derive(Default)]
struct FakeHostState {
    shell: HashMap<String, Option<CommandOutput>>,
    existing: HashSet<PathBuf>,
    scripts: VecDeque<FakeScript>,
    spawned: Vec<LaunchSpec>,
    killed: Vec<Arc<AtomicBool>>,
}

#[derive(Default)]
pub struct FakeHost {
    state: Mutex<FakeHostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shell(self, command: &str, code: Option<i32>, stdout: &str, stderr: &str) -> Self {
        self.state.lock().unwrap().shell.insert(
            command.to_string(),
            Some(CommandOutput {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        );
        self
    }

    pub fn shell_ok(self, command: &str, stdout: &str, stderr: &str) -> Self {
        self.shell(command, Some(0), stdout, stderr)
    }

    /// The shell itself fails to run `command`
    pub fn shell_error(self, command: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .shell
            .insert(command.to_string(), None);
        self
    }

    pub fn existing(self, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .existing
            .insert(PathBuf::from(path));
        self
    }

    /// Queue the behaviour of the next spawned process
    pub fn script(self, script: FakeScript) -> Self {
        self.push_script(script);
        self
    }

    pub fn push_script(&self, script: FakeScript) {
        self.state.lock().unwrap().scripts.push_back(script);
    }

    pub fn spawned(&self) -> Vec<LaunchSpec> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().spawned.len()
    }

    pub fn was_killed(&self, index: usize) -> bool {
        self.state.lock().unwrap().killed[index].load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Host for FakeHost {
    async fn run_shell(&self, command_line: &str) -> io::Result<CommandOutput> {
        match self.state.lock().unwrap().shell.get(command_line) {
            Some(Some(output)) => Ok(output.clone()),
            Some(None) => Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            None => Err(io::Error::new(io::ErrorKind::NotFound, command_line.to_string())),
        }
    }

    async fn path_exists(&self, path: &Path) -> bool {
        self.state.lock().unwrap().existing.contains(path)
    }

    async fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn RunningProcess>> {
        let mut state = self.state.lock().unwrap();
        let script = state
            .scripts
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, spec.program.clone()))?;
        let killed = Arc::new(AtomicBool::new(false));
        state.spawned.push(spec.clone());
        state.killed.push(killed.clone());
        Ok(Box::new(FakeProcess {
            pid: 4000 + state.spawned.len() as u32,
            delay: script.delay,
            lines: script.lines.into(),
            exit: script.exit,
            hang: script.hang,
            forwarding: true,
            exited: None,
            killed,
        }))
    }
}

struct FakeProcess {
    pid: u32,
    delay: Duration,
    lines: VecDeque<OutputLine>,
    exit: Option<i32>,
    hang: bool,
    forwarding: bool,
    exited: Option<Option<i32>>,
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl RunningProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn next_event(&mut self) -> ProcessEvent {
        if let Some(code) = self.exited {
            return ProcessEvent::Exited(code);
        }
        if self.forwarding {
            if let Some(line) = self.lines.pop_front() {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                return ProcessEvent::Output(line);
            }
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.exited = Some(self.exit);
        ProcessEvent::Exited(self.exit)
    }

    fn stop_forwarding(&mut self) {
        self.forwarding = false;
    }

    async fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
        if self.exited.is_none() {
            self.exited = Some(None);
        }
    }

    fn is_running(&mut self) -> bool {
        self.exited.is_none() && (self.hang || !self.lines.is_empty())
    }
}

/// Inventory answering from a queue, then from a fixed default
pub struct FakeInventory {
    queued: Mutex<VecDeque<Result<String, InventoryError>>>,
    default: Mutex<Result<String, InventoryError>>,
    calls: AtomicUsize,
}

impl FakeInventory {
    pub fn down() -> Self {
        Self::always(Err(InventoryError::Transport("connection refused".into())))
    }

    pub fn with_models(names: &[&str]) -> Self {
        Self::always(Ok(tags_body(names)))
    }

    pub fn always(response: Result<String, InventoryError>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default: Mutex::new(response),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer `response` once before falling back to the default
    pub fn then(self, response: Result<String, InventoryError>) -> Self {
        self.queued.lock().unwrap().push_back(response);
        self
    }

    pub fn set_default(&self, response: Result<String, InventoryError>) {
        *self.default.lock().unwrap() = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn tags_body(names: &[&str]) -> String {
    let models: Vec<_> = names
        .iter()
        .map(|name| serde_json::json!({ "name": name }))
        .collect();
    serde_json::json!({ "models": models }).to_string()
}

#[async_trait]
impl InventoryClient for FakeInventory {
    async fn fetch_tags(&self) -> Result<String, InventoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.queued.lock().unwrap().pop_front() {
            return response;
        }
        self.default.lock().unwrap().clone()
    }
}

/// Sink that remembers everything it was told
#[derive(Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<RuntimeStatus>>,
    progress: Mutex<Vec<DownloadProgress>>,
}

impl RecordingSink {
    pub fn statuses(&self) -> Vec<RuntimeStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<StatusKind> {
        self.statuses().iter().map(RuntimeStatus::kind).collect()
    }

    pub fn percents(&self) -> Vec<i32> {
        self.progress.lock().unwrap().iter().map(|p| p.progress).collect()
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, status: RuntimeStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    fn progress(&self, progress: DownloadProgress) {
        self.progress.lock().unwrap().push(progress);
    }
}
