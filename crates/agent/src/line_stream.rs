//! Reassemble discrete lines from a chunked model stream.
//!
//! Chunk boundaries are arbitrary. A line is yielded as soon as its newline
//! arrives; the last unterminated line is flushed when the stream ends.

use stepwise_core::error::ProviderError;
use stepwise_core::provider::ChunkReceiver;

/// Pulls one line at a time out of a [`ChunkReceiver`].
pub struct LineStream {
    rx: ChunkReceiver,
    buffer: String,
    finished: bool,
}

impl LineStream {
    pub fn new(rx: ChunkReceiver) -> Self {
        Self {
            rx,
            buffer: String::new(),
            finished: false,
        }
    }

    /// Next complete line without its terminator, `None` at end of stream.
    ///
    /// Provider errors are passed through; the stream is finished after one.
    pub async fn next_line(&mut self) -> Option<Result<String, ProviderError>> {
        loop {
            if let Some(line_end) = self.buffer.find('\n') {
                let line = self.buffer[..line_end]
                    .strip_suffix('\r')
                    .unwrap_or(&self.buffer[..line_end])
                    .to_string();
                self.buffer.drain(..=line_end);
                return Some(Ok(line));
            }

            if self.finished {
                if self.buffer.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut self.buffer);
                return Some(Ok(rest.strip_suffix('\r').unwrap_or(&rest).to_string()));
            }

            match self.rx.recv().await {
                Some(Ok(chunk)) => {
                    if let Some(content) = chunk.content {
                        self.buffer.push_str(&content);
                    }
                    if chunk.done {
                        self.finished = true;
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Some(Err(e));
                }
                None => self.finished = true,
            }
        }
    }
}
