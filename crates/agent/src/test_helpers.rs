//! Shared test helpers for agent tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use stepwise_core::error::ProviderError;
use stepwise_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};

/// One scripted answer of [`ScriptedProvider`].
pub enum Script {
    /// Stream this reply.
    Reply(String),
    /// Refuse the request.
    Fail(ProviderError),
    /// Stream this text, then break the stream.
    Interrupted(String),
    /// Stream this text, then hold the stream open until the reader leaves.
    Stall(String),
}

/// A streaming provider that answers from a script, in order.
///
/// Replies are cut into chunks of `chunk_size` characters. Every request is
/// recorded, including refused ones.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
    chunk_size: usize,
    context_length: usize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            chunk_size: 7,
            context_length: 4096,
        }
    }

    pub fn replies(replies: &[&str]) -> Self {
        Self::new(
            replies
                .iter()
                .map(|r| Script::Reply(r.to_string()))
                .collect(),
        )
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Concatenated content of request `index`.
    pub fn prompt_text(&self, index: usize) -> String {
        self.requests()[index]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

enum Ending {
    Done,
    Interrupted,
    Stall,
}

fn chunks(text: &str, size: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<_>>()
        .chunks(size)
        .map(|c| c.iter().collect())
        .collect()
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();

        let (text, ending) = match next {
            None => return Err(ProviderError::Exhausted("script is empty".into())),
            Some(Script::Fail(e)) => return Err(e),
            Some(Script::Reply(text)) => (text, Ending::Done),
            Some(Script::Interrupted(text)) => (text, Ending::Interrupted),
            Some(Script::Stall(text)) => (text, Ending::Stall),
        };

        let pieces = chunks(&text, self.chunk_size);
        let (tx, rx) = tokio::sync::mpsc::channel(pieces.len() + 1);
        tokio::spawn(async move {
            for piece in pieces {
                if tx.send(Ok(StreamChunk::text(piece))).await.is_err() {
                    return;
                }
            }
            let last = match ending {
                Ending::Done => Ok(StreamChunk::done()),
                Ending::Interrupted => {
                    Err(ProviderError::StreamInterrupted("connection reset".into()))
                }
                Ending::Stall => {
                    tx.closed().await;
                    return;
                }
            };
            let _ = tx.send(last).await;
        });
        Ok(rx)
    }

    fn context_length(&self) -> usize {
        self.context_length
    }
}

/// "line 1" .. "line n", newline separated.
pub fn numbered_file(n: usize) -> String {
    (1..=n)
        .map(|i| format!("line {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A reply following the edit protocol.
pub fn edit_reply(
    bounds: (usize, usize),
    range: (usize, usize),
    before: &str,
    after: &str,
    request: &str,
) -> String {
    format!(
        "I will edit the code.\n\
         1. I'll only edit lines that require changes.\n\
         2. I'll only edit inside lines {}-{}.\n\
         3. With those in mind, I choose to edit lines {}-{}.\n\
         4. Before edit, the code in lines {}-{} is:\n\n\
         ```\n{before}\n```\n\n\
         5. After editing to \"{request}\", the code will be:\n\n\
         ```\n{after}\n```\n",
        bounds.0, bounds.1, range.0, range.1, range.0, range.1
    )
}
