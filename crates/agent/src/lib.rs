//! The agent execution core of Stepwise.
//!
//! The agent follows a **Prompt → Stream → Match → Retry** cycle:
//!
//! 1. **Prompt** the model with the task, one guidance block per tool and a
//!    closing "What's your next action?"
//! 2. **Stream** the reply and reassemble it into lines
//! 3. **Match** each line against the selected tool's steps
//! 4. **Retry** with the broken reply and a correction when the protocol is
//!    violated, pruning old feedback to stay inside the token budget
//!
//! The loop ends when a tool completes, the retry budget is exhausted, the
//! prompt cannot fit the model, or the session is cancelled.

pub mod line_number;
pub mod line_stream;
pub mod loop_runner;
pub mod narration;
pub mod prompt;
pub mod steps;
pub mod tools;

#[cfg(test)]
mod test_helpers;

pub use line_number::{add_line_numbers, remove_line_numbers};
pub use line_stream::LineStream;
pub use loop_runner::{
    AgentInput, AgentLoop, MAX_ACTIONS, MAX_ATTEMPTS, NEXT_ACTION, ProviderTokenizer,
    SessionOutcome, run_agent,
};
pub use narration::Narration;
pub use prompt::{EditRequest, PromptBuilder, PromptError, build_edit_context};
pub use steps::{Step, StepHandler, StepSequence};
pub use tools::{ConfirmTool, EditParams, EditTool, PreviewFn};
