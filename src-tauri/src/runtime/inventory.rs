//! Client for the runtime's local model inventory (`GET /api/tags`).
//!
//! The same endpoint answers two questions: is the server up (the body parses
//! as an inventory) and is a model installed (its name appears in the list).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("Inventory request failed: {0}")]
    Transport(String),

    #[error("Inventory returned HTTP {0}")]
    Status(u16),

    #[error("Inventory response was not valid: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagEntry {
    pub name: String,
}

impl TagsResponse {
    /// True when any installed model name contains `model_id`
    pub fn contains(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m.name.contains(model_id))
    }
}

pub fn parse_tags(body: &str) -> Result<TagsResponse, InventoryError> {
    serde_json::from_str(body).map_err(|e| InventoryError::Malformed(e.to_string()))
}

#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Raw body of the inventory endpoint
    async fn fetch_tags(&self) -> Result<String, InventoryError>;

    async fn tags(&self) -> Result<TagsResponse, InventoryError> {
        parse_tags(&self.fetch_tags().await?)
    }
}

/// [`InventoryClient`] talking HTTP to a running server
pub struct HttpInventory {
    client: reqwest::Client,
    tags_url: String,
}

impl HttpInventory {
    pub fn new(base_url: &str) -> Result<Self, InventoryError> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| InventoryError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            tags_url: format!("{}/api/tags", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl InventoryClient for HttpInventory {
    async fn fetch_tags(&self) -> Result<String, InventoryError> {
        let response = self
            .client
            .get(&self.tags_url)
            .send()
            .await
            .map_err(|e| InventoryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InventoryError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| InventoryError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_list() {
        let tags = parse_tags(r#"{"models":[{"name":"qwen2.5-vl-7b:latest","size":1}]}"#).unwrap();
        assert!(tags.contains("qwen2.5-vl-7b"));
        assert!(!tags.contains("llama3"));
    }

    #[test]
    fn missing_models_field_is_an_empty_inventory() {
        assert_eq!(parse_tags("{}").unwrap(), TagsResponse::default());
    }

    #[test]
    fn malformed_body_is_rejected() {
        assert!(matches!(parse_tags("<html>"), Err(InventoryError::Malformed(_))));
        assert!(matches!(
            parse_tags(r#"{"models":"nope"}"#),
            Err(InventoryError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let inventory = HttpInventory::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            inventory.fetch_tags().await,
            Err(InventoryError::Transport(_))
        ));
    }
}
