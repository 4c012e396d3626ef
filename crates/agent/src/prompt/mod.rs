//! Prompt assembly.
//!
//! - [`builder`]: priority-pruned conversation under a token budget
//! - [`edit_context`]: the initial instruction of an edit session

pub mod builder;
pub mod edit_context;

pub use builder::{PromptBuilder, PromptError};
pub use edit_context::{EditRequest, build_edit_context};
