//! Provider trait: the abstraction over model access.
//!
//! A Provider knows how to stream a reply to a conversation and how to price
//! text in tokens. The agent loop only ever sees this trait: HTTP clients,
//! recorded transcripts and test doubles are interchangeable.

use crate::error::ProviderError;
use crate::message::Message;
use crate::token::estimate_tokens;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.5
}

/// A single chunk in a streaming response.
///
/// Chunk boundaries are arbitrary: a chunk may hold half a line or several.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    /// A content delta.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: false,
        }
    }

    /// The terminating chunk.
    pub fn done() -> Self {
        Self {
            content: None,
            done: true,
        }
    }
}

/// Receiving half of a streamed reply.
pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// The agent loop calls `stream()` without knowing which provider is being
/// used. Per-request timeouts, if any, are the provider's business.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and get a stream of response chunks.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError>;

    /// Count tokens the way this model does.
    ///
    /// Default implementation uses the 4-chars-per-token heuristic.
    fn count_tokens(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    /// Size of the model's context window in tokens.
    fn context_length(&self) -> usize {
        4096
    }
}
