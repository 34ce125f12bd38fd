use derive_more::{Display, From};

pub(crate) fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Why installing the runtime failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstallError {
    #[error("Failed to launch installer: {0}")]
    Launch(String),

    #[error("Installer failed ({}): {detail}", exit_label(.code))]
    Exited { code: Option<i32>, detail: String },

    #[error("Installer reported an error: {0}")]
    Reported(String),
}

/// Why the model server could not be brought up
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to launch server: {0}")]
    Launch(String),

    #[error("Server exited before it was ready ({})", exit_label(.code))]
    ExitedEarly { code: Option<i32> },

    #[error("Server did not report ready within {secs}s and was stopped")]
    Timeout { secs: u64 },
}

/// Why pulling the model failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PullError {
    #[error("Failed to launch model download: {0}")]
    Launch(String),

    #[error("Model download failed: {line}")]
    Reported { line: String, output: String },

    #[error("Model download failed ({}): {output}", exit_label(.code))]
    Exited { code: Option<i32>, output: String },
}

/// Any failure that halts a lifecycle run
#[derive(Debug, Clone, PartialEq, Eq, From, Display)]
pub enum LifecycleError {
    #[display("{_0}")]
    Install(InstallError),

    #[display("{_0}")]
    Server(SupervisorError),

    #[display("{_0}")]
    Pull(PullError),
}

impl std::error::Error for LifecycleError {}
