/// Failures talking to, or starting, the video backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Only video files can be uploaded: {0}")]
    InvalidFile(String),

    #[error("File is larger than 2GB ({size} bytes)")]
    TooLarge { size: u64 },

    #[error("File error: {0}")]
    Io(String),

    #[error("Backend request failed: {0}")]
    Transport(String),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected backend response: {0}")]
    Protocol(String),

    #[error("Failed to start backend: {0}")]
    Launch(String),
}
