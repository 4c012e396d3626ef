//! # Stepwise Core
//!
//! Domain types, traits, and error definitions for the Stepwise editing agent.
//! This crate has **no agent logic**; it defines the model that the other
//! crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is a trait here:
//! - [`Provider`] streams model replies and counts tokens
//! - [`Tokenizer`] prices prompt fragments
//! - [`Tool`] consumes a streamed reply line by line
//!
//! Implementations live in their respective crates, so the loop can be driven
//! by a recorded transcript in tests and by a real model elsewhere.

pub mod error;
pub mod message;
pub mod provider;
pub mod token;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
pub use token::{HeuristicTokenizer, Tokenizer};
pub use tool::{StepResult, Tool, ToolSet};
