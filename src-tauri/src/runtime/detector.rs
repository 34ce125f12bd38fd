use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info};

use super::host::{CommandOutput, Host};
use super::platform::PlatformPaths;

/// Substrings a version query prints even when it exits non-zero
/// (for example when the server is not running yet)
const VERSION_BANNERS: [&str; 2] = ["ollama version", "version is"];

/// Answers "is the runtime installed" and "which binary should be launched"
pub struct InstallationDetector {
    host: Arc<dyn Host>,
    paths: PlatformPaths,
}

impl InstallationDetector {
    pub fn new(host: Arc<dyn Host>, paths: PlatformPaths) -> Self {
        Self { host, paths }
    }

    /// Never fails: every error counts as "not installed".
    ///
    /// A working binary on PATH is preferred evidence; an existing candidate
    /// file is the fallback.
    pub async fn is_installed(&self) -> bool {
        match self.host.run_shell(&self.paths.version_command).await {
            Ok(output) if looks_installed(&output) => {
                debug!("Version check succeeded: {}", output.combined());
                return true;
            }
            Ok(output) => debug!("Version check inconclusive: {:?}", output),
            Err(e) => debug!("Version check failed: {}", e),
        }

        match self.first_existing_candidate().await {
            Some(path) => {
                info!("Found Ollama at {}", path.display());
                true
            }
            None => false,
        }
    }

    /// Program to launch: the PATH-resolved command when the check command
    /// finds it, otherwise the first candidate that exists, otherwise the
    /// platform default location.
    pub async fn resolve_executable(&self) -> String {
        if let Ok(output) = self.host.run_shell(&self.paths.check_command).await {
            if output.success() && !output.stdout.trim().is_empty() {
                return self.paths.command_name.clone();
            }
        }
        self.first_existing_candidate()
            .await
            .unwrap_or_else(|| self.paths.exe_path.clone())
            .to_string_lossy()
            .into_owned()
    }

    async fn first_existing_candidate(&self) -> Option<PathBuf> {
        for path in &self.paths.candidate_paths {
            if self.host.path_exists(path).await {
                return Some(path.clone());
            }
        }
        None
    }
}

/// Output counts when the command succeeded and printed something, or when
/// either stream carries a version banner. A failing command's bare output is
/// usually the shell's "not found" message, so it is not enough on its own.
fn looks_installed(output: &CommandOutput) -> bool {
    let combined = output.combined();
    if combined.is_empty() {
        return false;
    }
    let lower = combined.to_lowercase();
    output.success() || VERSION_BANNERS.iter().any(|banner| lower.contains(banner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::platform::Os;
    use crate::runtime::testing::FakeHost;
    use std::path::Path;

    fn detector(host: FakeHost) -> InstallationDetector {
        InstallationDetector::new(
            Arc::new(host),
            PlatformPaths::resolve(Os::MacOs, Path::new("/Users/me")),
        )
    }

    #[tokio::test]
    async fn version_on_stdout_counts() {
        let host = FakeHost::new().shell_ok("ollama --version", "ollama version is 0.5.7", "");
        assert!(detector(host).is_installed().await);
    }

    #[tokio::test]
    async fn version_banner_on_stderr_counts_even_on_failure() {
        let host = FakeHost::new().shell(
            "ollama --version",
            Some(1),
            "",
            "Warning: could not connect to a running Ollama instance\nWarning: client version is 0.5.7",
        );
        assert!(detector(host).is_installed().await);
    }

    #[tokio::test]
    async fn falls_back_to_candidate_paths() {
        let host = FakeHost::new()
            .shell("ollama --version", Some(127), "", "sh: ollama: command not found")
            .existing("/usr/local/bin/ollama");
        assert!(detector(host).is_installed().await);
    }

    #[tokio::test]
    async fn nothing_found_is_not_installed() {
        let host = FakeHost::new().shell("ollama --version", Some(127), "", "sh: ollama: command not found");
        assert!(!detector(host).is_installed().await);
    }

    #[tokio::test]
    async fn shell_errors_never_escape() {
        let host = FakeHost::new().shell_error("ollama --version");
        assert!(!detector(host).is_installed().await);
    }

    #[tokio::test]
    async fn path_resolved_command_is_preferred() {
        let host = FakeHost::new()
            .shell_ok("which ollama", "/opt/homebrew/bin/ollama\n", "")
            .existing("/Users/me/Desktop/ollama/ollama");
        assert_eq!(detector(host).resolve_executable().await, "ollama");
    }

    #[tokio::test]
    async fn resolution_falls_back_to_candidates_then_default() {
        let host = FakeHost::new().existing("/usr/local/bin/ollama");
        assert_eq!(detector(host).resolve_executable().await, "/usr/local/bin/ollama");

        let host = FakeHost::new();
        assert_eq!(
            detector(host).resolve_executable().await,
            "/Users/me/Desktop/ollama/ollama"
        );
    }
}
