//! Process and filesystem access used by the lifecycle core.
//!
//! Every side effect the runtime manager performs goes through [`Host`], so
//! the installer, supervisor and model manager can be driven by scripted
//! fakes in tests.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use eodi_signals::{LineSplitter, OutputLine, OutputStream};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Upper bound for short shell probes (`which`, `--version`)
const SHELL_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured result of a short-lived shell command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Both streams, trimmed and joined. Some tools print their version on stderr.
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Everything needed to start a long-running child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Short name used as the log prefix for the child's output
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(label: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envs
            .extend(envs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Human readable command line for logs and error messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a running child process reported next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(OutputLine),
    /// Both pipes closed and the process was reaped. Repeats on every later call.
    Exited(Option<i32>),
}

#[async_trait]
pub trait RunningProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Next output line, or the exit once all output has been consumed
    async fn next_event(&mut self) -> ProcessEvent;

    /// Stop buffering output for [`RunningProcess::next_event`]. The pipes keep
    /// being drained into the log so the child never blocks on a full pipe.
    fn stop_forwarding(&mut self);

    async fn kill(&mut self);

    fn is_running(&mut self) -> bool;
}

#[async_trait]
pub trait Host: Send + Sync {
    /// Run a command line through the platform shell and capture its output
    async fn run_shell(&self, command_line: &str) -> io::Result<CommandOutput>;

    async fn path_exists(&self, path: &Path) -> bool;

    async fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn RunningProcess>>;
}

/// Reap a process whose outcome has already been decided, logging its exit
pub fn drain_in_background(mut process: Box<dyn RunningProcess>, label: String) {
    process.stop_forwarding();
    tokio::spawn(async move {
        if let ProcessEvent::Exited(code) = process.next_event().await {
            debug!("{} exited after completion ({:?})", label, code);
        }
    });
}

/// Last few lines a child printed, kept for error messages
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: std::collections::VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: std::collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: &OutputLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.text.clone());
    }

    pub fn text(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// [`Host`] backed by the real operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    fn shell(command_line: &str) -> Command {
        #[cfg(target_os = "windows")]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command_line]);
            cmd
        };
        #[cfg(not(target_os = "windows"))]
        let mut cmd = {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command_line]);
            cmd
        };
        hide_console(&mut cmd);
        cmd
    }
}

#[cfg(target_os = "windows")]
fn hide_console(cmd: &mut Command) {
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(target_os = "windows"))]
fn hide_console(_cmd: &mut Command) {}

#[async_trait]
impl Host for SystemHost {
    async fn run_shell(&self, command_line: &str) -> io::Result<CommandOutput> {
        let mut cmd = Self::shell(command_line);
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let output = tokio::time::timeout(SHELL_TIMEOUT, cmd.output())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("`{}` did not finish within {:?}", command_line, SHELL_TIMEOUT),
                )
            })??;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn path_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn spawn(&self, spec: &LaunchSpec) -> io::Result<Box<dyn RunningProcess>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }
        hide_console(&mut cmd);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        debug!("Spawned {} (pid {:?}): {}", spec.label, pid, spec.command_line());

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, OutputStream::Stdout, spec.label.clone(), tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, OutputStream::Stderr, spec.label.clone(), tx);
        }

        Ok(Box::new(SystemProcess {
            label: spec.label.clone(),
            child,
            pid,
            lines: Some(rx),
            exit: None,
        }))
    }
}

fn forward_lines<R>(
    mut reader: R,
    stream: OutputStream,
    label: String,
    tx: mpsc::UnboundedSender<OutputLine>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut splitter = LineSplitter::new();
        let mut buf = [0u8; 4096];
        let emit = |text: String| {
            debug!("[{}:{}] {}", label, stream, text);
            // Receiver is gone once forwarding stops; keep draining anyway.
            let _ = tx.send(OutputLine::new(stream, text));
        };
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => splitter.push(&buf[..n]).into_iter().for_each(&emit),
                Err(e) => {
                    warn!("Failed to read {} of {}: {}", stream, label, e);
                    break;
                }
            }
        }
        if let Some(text) = splitter.finish() {
            emit(text);
        }
    });
}

struct SystemProcess {
    label: String,
    child: Child,
    pid: Option<u32>,
    lines: Option<mpsc::UnboundedReceiver<OutputLine>>,
    exit: Option<Option<i32>>,
}

#[async_trait]
impl RunningProcess for SystemProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    async fn next_event(&mut self) -> ProcessEvent {
        if let Some(code) = self.exit {
            return ProcessEvent::Exited(code);
        }
        if let Some(rx) = self.lines.as_mut() {
            if let Some(line) = rx.recv().await {
                return ProcessEvent::Output(line);
            }
            self.lines = None;
        }
        let code = match self.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("Failed to wait for {}: {}", self.label, e);
                None
            }
        };
        self.exit = Some(code);
        ProcessEvent::Exited(code)
    }

    fn stop_forwarding(&mut self) {
        self.lines = None;
    }

    async fn kill(&mut self) {
        if self.exit.is_some() {
            return;
        }
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill {} (pid {:?}): {}", self.label, self.pid, e);
        }
        self.exit = Some(self.child.try_wait().ok().flatten().and_then(|s| s.code()));
    }

    fn is_running(&mut self) -> bool {
        self.exit.is_none() && matches!(self.child.try_wait(), Ok(None))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_shell_captures_both_streams() {
        let out = SystemHost
            .run_shell("echo out; echo err 1>&2; exit 3")
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.combined(), "out\nerr");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn spawned_process_reports_lines_then_exit() {
        let spec = LaunchSpec::new("test", "sh").args(["-c", "echo ready; echo oops 1>&2; exit 1"]);
        let mut process = SystemHost.spawn(&spec).await.unwrap();

        let mut lines = Vec::new();
        let code = loop {
            match process.next_event().await {
                ProcessEvent::Output(line) => lines.push(line),
                ProcessEvent::Exited(code) => break code,
            }
        };
        assert_eq!(code, Some(1));
        assert!(lines.contains(&OutputLine::stdout("ready")));
        assert!(lines.contains(&OutputLine::stderr("oops")));
        assert_eq!(process.next_event().await, ProcessEvent::Exited(Some(1)));
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn kill_stops_a_running_process() {
        let spec = LaunchSpec::new("sleeper", "sleep").arg("30");
        let mut process = SystemHost.spawn(&spec).await.unwrap();
        assert!(process.is_running());
        process.kill().await;
        assert!(!process.is_running());
    }

    #[test]
    fn output_tail_keeps_the_most_recent_lines() {
        let mut tail = OutputTail::new(2);
        for text in ["one", "two", "three"] {
            tail.push(&OutputLine::stdout(text));
        }
        assert_eq!(tail.text(), "two\nthree");
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = LaunchSpec::new("ollama", "ollama").arg("pull").arg("qwen2.5-vl-7b");
        assert_eq!(spec.command_line(), "ollama pull qwen2.5-vl-7b");
    }
}
