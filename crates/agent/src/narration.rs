//! Session narration.
//!
//! `Narration` is the human-facing progress feed of an agent session. It is
//! advisory: callers that only need the outcome use
//! [`AgentLoop::run`](crate::loop_runner::AgentLoop::run) instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Events emitted while a session runs.
///
/// Serialized with a `type` tag:
/// - `attempt_started`: a model request is about to be sent
/// - `tool_selected`: a reply line picked a tool
/// - `step_message`: a tool step reported progress
/// - `tool_error`: the reply broke the tool's protocol
/// - `no_tool_selected`: the reply ended without picking a tool
/// - `action_completed`: a tool ran to completion
/// - `succeeded`, `exhausted`, `infeasible`, `cancelled`: terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Narration {
    AttemptStarted { remaining: usize },

    ToolSelected { name: String },

    StepMessage { message: String },

    ToolError { message: String },

    NoToolSelected,

    ActionCompleted { tool: String, message: String },

    Succeeded,

    /// The retry budget or the action cap ran out.
    Exhausted,

    /// Even the unprunable part of the prompt does not fit.
    Infeasible { tokens: usize, budget: usize },

    Cancelled,
}

impl Narration {
    /// Stable event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AttemptStarted { .. } => "attempt_started",
            Self::ToolSelected { .. } => "tool_selected",
            Self::StepMessage { .. } => "step_message",
            Self::ToolError { .. } => "tool_error",
            Self::NoToolSelected => "no_tool_selected",
            Self::ActionCompleted { .. } => "action_completed",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::Infeasible { .. } => "infeasible",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the session ends with this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Exhausted | Self::Infeasible { .. } | Self::Cancelled
        )
    }
}

impl fmt::Display for Narration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttemptStarted { remaining } => {
                write!(f, "Retries left: {remaining}. Waiting for the model...")
            }
            Self::ToolSelected { name } => write!(f, "Agent selected tool \"{name}\"!"),
            Self::StepMessage { message } => write!(f, "Tool message: {message}"),
            Self::ToolError { message } => write!(f, "Tool error: {message} Retrying!"),
            Self::NoToolSelected => write!(f, "No tool selected, retrying!"),
            Self::ActionCompleted { tool, .. } => write!(f, "Tool \"{tool}\" completed!"),
            Self::Succeeded => write!(f, "Session finished!"),
            Self::Exhausted => write!(f, "Too many retries, exiting!"),
            Self::Infeasible { tokens, budget } => write!(
                f,
                "The prompt needs {tokens} tokens but the model only accepts {budget}, exiting!"
            ),
            Self::Cancelled => write!(f, "Session cancelled."),
        }
    }
}
