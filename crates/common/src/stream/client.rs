//! HTTP client for the streaming chat backend

use crate::config::ChatConfig;
use crate::errors::{AppError, Result};
use crate::resources::ResourcePreferences;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Body chunks exactly as the transport delivered them
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// One user turn sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(flatten)]
    pub preferences: ResourcePreferences,
}

/// Source of streamed chat turns
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a turn and hand back its body as raw chunks
    async fn open(&self, request: &ChatTurnRequest) -> Result<ChunkStream>;
}

/// Opens streaming chat responses over HTTP
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    url: String,
}

impl ChatClient {
    /// Only connecting is bounded; the body streams for as long as the
    /// backend keeps writing
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create chat client: {}", e),
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    /// POST a turn and stream back the response body
    async fn open(&self, request: &ChatTurnRequest) -> Result<ChunkStream> {
        debug!(url = %self.url, history = request.history.len(), "Opening chat stream");

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                status: status.as_u16(),
                endpoint: self.url.clone(),
            });
        }

        let chunks = stream::unfold(Some(response), |state| async move {
            let mut response = state?;
            match response.chunk().await {
                Ok(Some(bytes)) => Some((Ok(bytes.to_vec()), Some(response))),
                Ok(None) => None,
                Err(e) => Some((Err(AppError::from(e)), None)),
            }
        });

        Ok(chunks.boxed())
    }
}
