//! Replay provider: streams recorded replies.
//!
//! Each call to `stream()` serves the next recorded reply, cut into chunks of
//! a fixed number of characters so the consumer sees realistic, arbitrary
//! chunk boundaries. Every request is kept for later inspection.

use async_trait::async_trait;
use stepwise_config::ReplayConfig;
use stepwise_core::error::ProviderError;
use stepwise_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// A provider that replays recorded replies in order.
pub struct ReplayProvider {
    name: String,
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
    chunk_size: usize,
    context_length: usize,
}

impl ReplayProvider {
    /// Create a provider serving `replies` in order.
    pub fn new(replies: Vec<String>) -> Self {
        let defaults = ReplayConfig::default();
        Self {
            name: "replay".into(),
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            chunk_size: defaults.chunk_size,
            context_length: defaults.context_length,
        }
    }

    /// Create a provider from configuration.
    pub fn from_config(replies: Vec<String>, config: &ReplayConfig) -> Self {
        Self::new(replies)
            .with_chunk_size(config.chunk_size)
            .with_context_length(config.context_length)
    }

    /// Read one reply per file.
    pub fn from_files<P: AsRef<Path>>(
        paths: &[P],
        config: &ReplayConfig,
    ) -> std::io::Result<Self> {
        let replies = paths
            .iter()
            .map(std::fs::read_to_string)
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self::from_config(replies, config))
    }

    /// Characters per streamed chunk (minimum 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of replies not yet served.
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

/// Split `text` into pieces of at most `size` characters.
fn split_chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

#[async_trait]
impl Provider for ReplayProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let reply = {
            let mut replies = self
                .replies
                .lock()
                .map_err(|_| ProviderError::NotConfigured("replay queue poisoned".into()))?;
            replies.pop_front()
        };

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let reply = reply.ok_or_else(|| {
            ProviderError::Exhausted(format!("{} has no recorded reply left", self.name))
        })?;

        let chunks = split_chunks(&reply, self.chunk_size);
        debug!(provider = %self.name, chunks = chunks.len(), "Replaying recorded reply");

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(StreamChunk::text(chunk))).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });

        Ok(rx)
    }

    fn context_length(&self) -> usize {
        self.context_length
    }
}
