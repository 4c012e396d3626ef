//! Confirm tool: the model declares the request fulfilled.
//!
//! Registering it turns a session into a multi-action one: other tools may
//! run several times, and only a confirmation ends the session.

use async_trait::async_trait;
use regex::Regex;
use std::convert::Infallible;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{StepResult, Tool};

use crate::steps::{Step, StepHandler, StepSequence, literal_regex};

/// Literal-only protocols have no callbacks.
struct NoCallbacks;

#[async_trait]
impl StepHandler for NoCallbacks {
    type Action = Infallible;

    async fn on_assert(&mut self, action: Infallible) -> StepResult {
        match action {}
    }
}

fn confirmation(request: &str) -> String {
    format!("I want to confirm that \"{request}\" is done.")
}

pub struct ConfirmTool {
    request: String,
    sentence: Regex,
    sequence: StepSequence<Infallible>,
}

impl ConfirmTool {
    pub fn new(request: impl Into<String>) -> Result<Self, ToolError> {
        let request = request.into();
        let sentence = literal_regex(&confirmation(&request))
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;
        let mut tool = Self {
            request,
            sentence,
            sequence: StepSequence::new(Vec::new()),
        };
        tool.reset();
        Ok(tool)
    }
}

#[async_trait]
impl Tool for ConfirmTool {
    fn name(&self) -> &str {
        "confirm"
    }

    fn intent(&self) -> String {
        format!("confirm that \"{}\" is done", self.request)
    }

    fn format(&self) -> String {
        format!("1. {}\n", confirmation(&self.request))
    }

    fn prefix(&self) -> &str {
        "1. I want to confirm"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.sequence = StepSequence::new(vec![Step::literal(
            "1.",
            self.sentence.clone(),
            &confirmation(&self.request),
        )]);
    }

    fn current_step(&self) -> usize {
        self.sequence.current()
    }

    fn step_count(&self) -> usize {
        self.sequence.len()
    }

    async fn run_step(&mut self, line: &str) -> StepResult {
        self.sequence.run(&mut NoCallbacks, line).await
    }

    fn check_status(&self) -> StepResult {
        self.sequence.check_status()
    }

    fn success_message(&self) -> String {
        "Confirmed!".into()
    }
}
