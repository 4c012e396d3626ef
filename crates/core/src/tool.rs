//! Tool trait: the abstraction over reply protocols.
//!
//! A tool is a stateful, multi-step protocol the model can choose to follow
//! in its reply. The agent loop feeds the streamed reply to the selected tool
//! one line at a time; the tool answers each line with a [`StepResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of feeding one line to a tool's current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum StepResult {
    /// Nothing changed; wait for the next line.
    Continue,
    /// The current step is satisfied and the tool moved to the next one.
    Break(String),
    /// The reply broke the protocol. Terminal for the current attempt.
    Error(String),
    /// Every step of the tool is satisfied.
    Complete,
}

impl StepResult {
    /// A `Break` with no informational message.
    pub fn advance() -> Self {
        Self::Break(String::new())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// The core Tool trait.
///
/// A tool is built once per session with immutable parameters. Everything it
/// learns while reading a reply is ephemeral and must be dropped by
/// [`reset`](Tool::reset) before each attempt; `current_step` only moves
/// forward between resets.
#[async_trait]
pub trait Tool: Send {
    /// Short unique name (e.g., "edit").
    fn name(&self) -> &str;

    /// What the model wants when it chooses this tool.
    fn intent(&self) -> String;

    /// The exact reply format the model has to follow.
    fn format(&self) -> String;

    /// A reply line starting with this prefix selects the tool.
    fn prefix(&self) -> &str;

    /// Whether a successful run of this tool ends the whole session.
    fn is_terminal(&self) -> bool {
        false
    }

    /// Drop all per-attempt state and rebuild stateful steps.
    fn reset(&mut self);

    /// Index of the step waiting for input.
    fn current_step(&self) -> usize;

    /// Number of steps in the protocol.
    fn step_count(&self) -> usize;

    /// Feed one line to the current step, advancing on `Break`.
    async fn run_step(&mut self, line: &str) -> StepResult;

    /// End-of-stream verdict: `Complete`, or `Error` with the message of the
    /// step still pending.
    fn check_status(&self) -> StepResult;

    /// Feedback shown to the model after a successful run.
    fn success_message(&self) -> String;

    /// Whether every step has been satisfied.
    fn is_complete(&self) -> bool {
        self.current_step() >= self.step_count()
    }
}

/// An ordered set of tools.
///
/// Order matters: when several prefixes match a line, the first registered
/// tool wins.
pub struct ToolSet {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool after the existing ones.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, tool: Box<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Index of the first tool whose prefix starts `line` (case-sensitive).
    pub fn select(&self, line: &str) -> Option<usize> {
        self.tools
            .iter()
            .position(|t| !t.prefix().is_empty() && line.starts_with(t.prefix()))
    }

    pub fn get(&self, index: usize) -> Option<&dyn Tool> {
        self.tools.get(index).map(|t| t.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Box<dyn Tool>> {
        self.tools.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.iter().map(|t| t.as_ref())
    }

    /// Reset every tool's ephemeral state.
    pub fn reset_all(&mut self) {
        for tool in &mut self.tools {
            tool.reset();
        }
    }

    /// Whether any registered tool ends the session on success.
    pub fn has_terminal(&self) -> bool {
        self.tools.iter().any(|t| t.is_terminal())
    }

    /// List all registered tool names, in order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}
