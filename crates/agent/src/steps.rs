//! Step matcher framework.
//!
//! A tool's protocol is a [`StepSequence`]: an ordered list of [`Step`]s and
//! the index of the step waiting for input. Each step consumes one reply line
//! and answers with a [`StepResult`]:
//!
//! | Step | Behaviour |
//! |------|-----------|
//! | pattern | skips lines without its prefix, errors on a prefixed line that does not match, breaks (or defers to the handler) on a match |
//! | code block | waits for an opening fence, hands every inner line to the handler, breaks on the closing fence |
//! | assert | ignores its line and asks the handler to validate what was accumulated |
//!
//! Steps carry no references into the tool. Work that touches tool state is
//! dispatched to a [`StepHandler`] with the step's action tag, and the only
//! mutable scratch state (a code block's `begun` flag) lives in the step
//! itself, so rebuilding the sequence is a complete reset.

use async_trait::async_trait;
use regex::{Captures, Regex, RegexBuilder};
use stepwise_core::tool::StepResult;

/// Opening and closing marker of a fenced code block.
pub const FENCE: &str = "```";

/// Receives the callbacks of a [`StepSequence`].
#[async_trait]
pub trait StepHandler: Send {
    /// Tags which callback a step wants.
    type Action: Copy + Send + Sync + 'static;

    /// A pattern step with an action matched its line. The returned result
    /// replaces the default `Break`, so validation can fail the step.
    fn on_match(&mut self, _action: Self::Action, _captures: &Captures<'_>) -> StepResult {
        StepResult::advance()
    }

    /// A line inside a code block.
    fn on_code_line(&mut self, _action: Self::Action, _line: &str) {}

    /// An assert step was reached.
    async fn on_assert(&mut self, action: Self::Action) -> StepResult;
}

/// Case-insensitive regex matching `text` literally.
pub fn literal_regex(text: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&regex::escape(text))
        .case_insensitive(true)
        .build()
}

enum StepKind<A> {
    Pattern {
        prefix: String,
        regex: Regex,
        action: Option<A>,
    },
    CodeBlock {
        action: A,
        begun: bool,
    },
    Assert {
        action: A,
    },
}

/// One line-consuming unit of a tool protocol.
pub struct Step<A> {
    kind: StepKind<A>,
    /// Human-readable form of what the step waits for.
    expected: String,
}

impl<A: Copy + Send + Sync + 'static> Step<A> {
    /// Match lines starting with `prefix` against `regex`.
    ///
    /// `expected` is shown to the model when the line does not match.
    pub fn pattern(
        prefix: impl Into<String>,
        regex: Regex,
        expected: impl Into<String>,
        action: Option<A>,
    ) -> Self {
        Self {
            kind: StepKind::Pattern {
                prefix: prefix.into(),
                regex,
                action,
            },
            expected: expected.into(),
        }
    }

    /// Require the sentence `"{prefix} {text}"`.
    ///
    /// `sentence` is `text` compiled with [`literal_regex`]; tools compile it
    /// once and hand a clone to every rebuilt step.
    pub fn literal(prefix: &str, sentence: Regex, text: &str) -> Self {
        Self::pattern(prefix, sentence, format!("{prefix} {text}"), None)
    }

    /// Accumulate a fenced code block line by line.
    pub fn code_block(action: A) -> Self {
        Self {
            kind: StepKind::CodeBlock {
                action,
                begun: false,
            },
            expected: "a code block".into(),
        }
    }

    /// Validate accumulated state without consuming input.
    pub fn assert(action: A, expected: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Assert { action },
            expected: expected.into(),
        }
    }

    /// Message used when the reply ends while this step is pending.
    pub fn pending_message(&self) -> String {
        match &self.kind {
            StepKind::Pattern { .. } => {
                format!("Expected \"{}\" to be found in your reply!", self.expected)
            }
            StepKind::CodeBlock { begun: false, .. } => {
                "Expected a code block in your reply!".into()
            }
            StepKind::CodeBlock { begun: true, .. } => {
                format!("Expected the code block to be closed with {FENCE} in your reply!")
            }
            StepKind::Assert { .. } => {
                format!("Your reply ended before {}!", self.expected)
            }
        }
    }

    async fn feed<H>(&mut self, handler: &mut H, line: &str) -> StepResult
    where
        H: StepHandler<Action = A>,
    {
        match &mut self.kind {
            StepKind::Pattern {
                prefix,
                regex,
                action,
            } => {
                if !line.starts_with(prefix.as_str()) {
                    return StepResult::Continue;
                }
                match regex.captures(line) {
                    None => StepResult::Error(format!(
                        "The line \"{line}\" does not follow the format, expected \"{}\".",
                        self.expected
                    )),
                    Some(captures) => match action {
                        Some(action) => handler.on_match(*action, &captures),
                        None => StepResult::advance(),
                    },
                }
            }
            StepKind::CodeBlock { action, begun } => {
                let fence = line.starts_with(FENCE);
                if !*begun {
                    if fence {
                        *begun = true;
                    }
                    StepResult::Continue
                } else if fence {
                    StepResult::advance()
                } else {
                    handler.on_code_line(*action, line);
                    StepResult::Continue
                }
            }
            StepKind::Assert { action } => handler.on_assert(*action).await,
        }
    }
}

/// Ordered steps of one tool plus the index of the pending step.
pub struct StepSequence<A> {
    steps: Vec<Step<A>>,
    current: usize,
}

impl<A: Copy + Send + Sync + 'static> StepSequence<A> {
    pub fn new(steps: Vec<Step<A>>) -> Self {
        Self { steps, current: 0 }
    }

    /// Index of the step waiting for input.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.steps.len()
    }

    /// Feed `line` to the pending step; a `Break` advances to the next one.
    ///
    /// Once every step is satisfied this keeps answering `Complete`.
    pub async fn run<H>(&mut self, handler: &mut H, line: &str) -> StepResult
    where
        H: StepHandler<Action = A>,
    {
        let Some(step) = self.steps.get_mut(self.current) else {
            return StepResult::Complete;
        };

        let result = step.feed(handler, line).await;
        if matches!(result, StepResult::Break(_)) {
            self.current += 1;
        }
        result
    }

    /// `Complete` if every step is satisfied, otherwise an `Error` carrying
    /// the pending step's message.
    pub fn check_status(&self) -> StepResult {
        match self.steps.get(self.current) {
            None => StepResult::Complete,
            Some(step) => StepResult::Error(step.pending_message()),
        }
    }
}
