//! Platform specific installation of the Ollama runtime.

use std::sync::Arc;

use eodi_signals::{Matcher, RuleTable, StreamFilter};
use log::{error, info, warn};

use super::coalesce::Coalesced;
use super::error::InstallError;
use super::host::{drain_in_background, Host, LaunchSpec, OutputTail, ProcessEvent};
use super::platform::{Os, PlatformPaths};

const WINDOWS_INSTALLER_URL: &str = "https://ollama.com/download/OllamaSetup.exe";
const UNIX_INSTALL_SCRIPT: &str = "curl -fsSL https://ollama.com/install.sh | sh";

/// What an installer output line means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallSignal {
    Completed,
    Failed,
}

/// Markers printed by Homebrew
pub fn package_manager_rules() -> RuleTable<InstallSignal> {
    use InstallSignal::*;
    RuleTable::new()
        .signal(StreamFilter::Stdout, Matcher::contains("==> Summary"), Completed)
        .signal(StreamFilter::Stdout, Matcher::contains("🍺"), Completed)
        .signal(StreamFilter::Stderr, Matcher::contains("already installed"), Completed)
        .signal(StreamFilter::Stderr, Matcher::contains("Error:"), Failed)
        .signal(StreamFilter::Stderr, Matcher::contains("already locked"), Failed)
        .signal(StreamFilter::Stderr, Matcher::contains("failed"), Failed)
}

/// How to install on one platform. Plans without rules succeed on exit code 0 only.
#[derive(Debug)]
pub struct InstallPlan {
    pub launch: LaunchSpec,
    pub rules: RuleTable<InstallSignal>,
}

impl InstallPlan {
    pub fn for_platform(paths: &PlatformPaths) -> Self {
        match paths.os {
            Os::MacOs => Self {
                // GUI apps do not inherit the login shell PATH
                launch: LaunchSpec::new("brew", "/bin/sh").args([
                    "-c",
                    "PATH=/opt/homebrew/bin:/usr/local/bin:$PATH brew install ollama",
                ]),
                rules: package_manager_rules(),
            },
            Os::Windows => {
                let script = format!(
                    "$ErrorActionPreference='Stop'; \
                     $setup = Join-Path $env:TEMP 'OllamaSetup.exe'; \
                     Invoke-WebRequest -Uri '{url}' -OutFile $setup -UseBasicParsing; \
                     $p = Start-Process -FilePath $setup -ArgumentList '/VERYSILENT','/NORESTART','/DIR={dir}' -Wait -PassThru; \
                     exit $p.ExitCode",
                    url = WINDOWS_INSTALLER_URL,
                    dir = paths.install_path.display(),
                );
                Self {
                    launch: LaunchSpec::new("installer", "powershell").args([
                        "-NoProfile".to_string(),
                        "-ExecutionPolicy".to_string(),
                        "Bypass".to_string(),
                        "-Command".to_string(),
                        script,
                    ]),
                    rules: RuleTable::new(),
                }
            }
            Os::Linux => Self {
                launch: LaunchSpec::new("install.sh", "sh").args(["-c", UNIX_INSTALL_SCRIPT]),
                rules: RuleTable::new(),
            },
        }
    }
}

/// Runs the install plan. Concurrent requests share one installer process.
pub struct RuntimeInstaller {
    host: Arc<dyn Host>,
    plan: Arc<InstallPlan>,
    inflight: Coalesced<Result<(), InstallError>>,
}

impl RuntimeInstaller {
    pub fn new(host: Arc<dyn Host>, plan: InstallPlan) -> Self {
        Self {
            host,
            plan: Arc::new(plan),
            inflight: Coalesced::new(),
        }
    }

    pub fn is_installing(&self) -> bool {
        self.inflight.is_running()
    }

    /// Install and report why it failed
    pub async fn try_install(&self) -> Result<(), InstallError> {
        let host = self.host.clone();
        let plan = self.plan.clone();
        self.inflight
            .run(move || async move { run_plan(host.as_ref(), &plan).await })
            .await
    }

    /// Never fails: errors are logged and reported as `false`
    pub async fn install(&self) -> bool {
        match self.try_install().await {
            Ok(()) => true,
            Err(e) => {
                error!("Ollama installation failed: {}", e);
                false
            }
        }
    }
}

async fn run_plan(host: &dyn Host, plan: &InstallPlan) -> Result<(), InstallError> {
    info!("Installing Ollama: {}", plan.launch.command_line());

    let mut process = host
        .spawn(&plan.launch)
        .await
        .map_err(|e| InstallError::Launch(e.to_string()))?;

    let mut tail = OutputTail::new(20);
    let mut reported: Option<String> = None;

    loop {
        match process.next_event().await {
            ProcessEvent::Output(line) => {
                tail.push(&line);
                match plan.rules.classify(&line) {
                    Some(InstallSignal::Completed) => {
                        info!("Ollama installation completed: {}", line.text);
                        drain_in_background(process, plan.launch.label.clone());
                        return Ok(());
                    }
                    Some(InstallSignal::Failed) => {
                        warn!("Installer reported: {}", line.text);
                        reported.get_or_insert(line.text);
                    }
                    None => {}
                }
            }
            ProcessEvent::Exited(code) => {
                return match (code, reported) {
                    (_, Some(line)) => Err(InstallError::Reported(line)),
                    (Some(0), None) => {
                        info!("Ollama installation completed");
                        Ok(())
                    }
                    (code, None) => Err(InstallError::Exited {
                        code,
                        detail: tail.text(),
                    }),
                };
            }
        }
    }
}
