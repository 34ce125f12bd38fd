//! HTTP client for the video backend.
//!
//! The backend owns the response shapes, so results are passed through to
//! the UI as JSON values.

use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncReadExt;

use super::error::BackendError;

/// Largest video the backend accepts
pub const MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Bytes sent per `/upload/chunk` request
pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;

const VIDEO_TYPES: [(&str, &str); 5] = [
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadInit<'a> {
    filename: &'a str,
    file_size: u64,
    content_type: &'a str,
    total_chunks: u64,
}

#[derive(Debug, Deserialize)]
struct UploadSession {
    #[serde(alias = "uploadId")]
    upload_id: String,
}

/// A file that passed upload validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub filename: String,
    pub size: u64,
    pub content_type: &'static str,
}

impl UploadCandidate {
    pub fn total_chunks(&self) -> u64 {
        self.size.div_ceil(CHUNK_SIZE as u64).max(1)
    }
}

/// Check the file type and size before anything is sent
pub fn validate_upload(path: &Path, size: u64) -> Result<UploadCandidate, BackendError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BackendError::InvalidFile(path.display().to_string()))?;

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let content_type = VIDEO_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
        .ok_or_else(|| BackendError::InvalidFile(filename.clone()))?;

    if size > MAX_UPLOAD_BYTES {
        return Err(BackendError::TooLarge { size });
    }

    Ok(UploadCandidate {
        filename,
        size,
        content_type,
    })
}

pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn list_videos(&self) -> Result<Value, BackendError> {
        self.send(self.client.get(self.url("/videos"))).await
    }

    pub async fn analyze_video(&self, video_id: u32) -> Result<Value, BackendError> {
        self.send(self.client.post(self.url(&format!("/analyze/{}", video_id))))
            .await
    }

    pub async fn list_short_videos(&self) -> Result<Value, BackendError> {
        self.send(self.client.get(self.url("/shorts/videos"))).await
    }

    pub async fn generate_shorts(
        &self,
        video_id: u32,
        criteria: Option<Value>,
    ) -> Result<Value, BackendError> {
        let request = self
            .client
            .post(self.url(&format!("/shorts/generate/{}", video_id)))
            .json(&criteria.unwrap_or_else(|| Value::Object(Default::default())));
        self.send(request).await
    }

    /// Upload a local video in chunks: init, one request per chunk, complete
    pub async fn upload_video(&self, path: &Path) -> Result<Value, BackendError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| BackendError::Io(format!("{}: {}", path.display(), e)))?;
        let candidate = validate_upload(path, metadata.len())?;
        let total_chunks = candidate.total_chunks();
        info!(
            "Uploading {} ({} bytes, {} chunks)",
            candidate.filename, candidate.size, total_chunks
        );

        let init = UploadInit {
            filename: &candidate.filename,
            file_size: candidate.size,
            content_type: candidate.content_type,
            total_chunks,
        };
        let session: UploadSession = serde_json::from_value(
            self.send(self.client.post(self.url("/upload/init")).json(&init))
                .await?,
        )
        .map_err(|e| BackendError::Protocol(e.to_string()))?;

        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| BackendError::Io(e.to_string()))?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        for index in 0..total_chunks {
            let len = read_chunk(&mut file, &mut buf)
                .await
                .map_err(|e| BackendError::Io(e.to_string()))?;
            let index_param = index.to_string();
            let request = self
                .client
                .post(self.url("/upload/chunk"))
                .query(&[
                    ("upload_id", session.upload_id.as_str()),
                    ("index", index_param.as_str()),
                ])
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(buf[..len].to_vec());
            self.send(request).await?;
            debug!("Uploaded chunk {}/{}", index + 1, total_chunks);
        }

        self.send(
            self.client
                .post(self.url("/upload/complete"))
                .json(&serde_json::json!({ "upload_id": session.upload_id })),
        )
        .await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::Protocol(e.to_string()))
    }
}

/// Fill `buf` as far as the file allows
async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
