use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tauri::State;

use crate::backend::BackendClient;

// ===== VIDEO BACKEND =====

#[tauri::command]
#[specta::specta]
pub async fn list_videos(backend: State<'_, Arc<BackendClient>>) -> Result<Value, String> {
    backend.list_videos().await.map_err(|e| e.to_string())
}

#[tauri::command]
#[specta::specta]
pub async fn upload_video(
    backend: State<'_, Arc<BackendClient>>,
    file_path: String,
) -> Result<Value, String> {
    backend
        .upload_video(&PathBuf::from(file_path))
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
#[specta::specta]
pub async fn analyze_video(
    backend: State<'_, Arc<BackendClient>>,
    video_id: u32,
) -> Result<Value, String> {
    backend
        .analyze_video(video_id)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
#[specta::specta]
pub async fn list_short_videos(backend: State<'_, Arc<BackendClient>>) -> Result<Value, String> {
    backend.list_short_videos().await.map_err(|e| e.to_string())
}

#[tauri::command]
#[specta::specta]
pub async fn generate_shorts(
    backend: State<'_, Arc<BackendClient>>,
    video_id: u32,
    criteria: Option<Value>,
) -> Result<Value, String> {
    backend
        .generate_shorts(video_id, criteria)
        .await
        .map_err(|e| e.to_string())
}
