//! The agent loop.
//!
//! One session drives a model through a set of line-protocol tools:
//!
//! 1. The prompt is the caller's context plus one guidance block per tool and
//!    a closing "What's your next action?".
//! 2. Each attempt rebuilds the prompt (pruning old feedback bands), resets
//!    the tools and streams one reply.
//! 3. Reply lines select a tool by prefix; the selected tool consumes every
//!    following line. A `Break` re-feeds the same line to the next step.
//! 4. A broken protocol turns into feedback (the reply plus a correction) and
//!    the next attempt starts, until the retry budget runs out.
//!
//! With a terminal tool (see [`ConfirmTool`](crate::tools::ConfirmTool))
//! registered, a completed action is appended to the conversation and the
//! session continues until the terminal tool succeeds.

use std::sync::Arc;
use stepwise_config::AppConfig;
use stepwise_core::error::Result;
use stepwise_core::message::Role;
use stepwise_core::provider::{Provider, ProviderRequest};
use stepwise_core::token::Tokenizer;
use stepwise_core::tool::{StepResult, ToolSet};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::line_stream::LineStream;
use crate::narration::Narration;
use crate::prompt::{PromptBuilder, PromptError};

/// Attempts per action.
pub const MAX_ATTEMPTS: usize = 3;

/// Completed actions per multi-action session.
pub const MAX_ACTIONS: usize = 8;

/// Closing directive of every prompt.
pub const NEXT_ACTION: &str = "What's your next action?";

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Succeeded,
    Exhausted,
    Infeasible,
    Cancelled,
}

/// What a session starts from.
pub enum AgentInput {
    /// A task description; priced with the provider's tokenizer.
    Text(String),
    /// A caller-built prompt with its own budget.
    Builder(PromptBuilder),
}

impl From<String> for AgentInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for AgentInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<PromptBuilder> for AgentInput {
    fn from(builder: PromptBuilder) -> Self {
        Self::Builder(builder)
    }
}

/// Prices prompt components with the model's own tokenizer.
pub struct ProviderTokenizer(pub Arc<dyn Provider>);

impl Tokenizer for ProviderTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.0.count_tokens(text)
    }
}

/// Everything one attempt learned from its reply.
#[derive(Default)]
struct Attempt {
    transcript: String,
    selected: Option<usize>,
    error: Option<String>,
}

async fn notify(narration: &mpsc::Sender<Narration>, event: Narration) {
    // Narration is advisory; a closed receiver does not stop the session.
    let _ = narration.send(event).await;
}

/// The core agent loop that drives a model through tool protocols.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Tokens kept free for the reply; also sent as the reply length cap
    reply_reserve: usize,

    /// Tools the model can choose from, in selection order
    tools: ToolSet,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: ToolSet) -> Self {
        let defaults = AppConfig::default();
        Self {
            provider,
            model: model.into(),
            temperature: defaults.default_temperature,
            reply_reserve: defaults.agent.reply_reserve_tokens,
            tools,
        }
    }

    /// Create an agent loop with model, temperature and reserve from `config`.
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig, tools: ToolSet) -> Self {
        Self::new(provider, config.default_model.clone(), tools)
            .with_temperature(config.default_temperature)
            .with_reply_reserve(config.agent.reply_reserve_tokens)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_reply_reserve(mut self, tokens: usize) -> Self {
        self.reply_reserve = tokens;
        self
    }

    /// Guidance block of every tool, in selection order.
    fn guidance(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| {
                format!(
                    "\nIf you want to **{}**, please format your reply as:\n\n{}",
                    tool.intent(),
                    tool.format()
                )
            })
            .collect()
    }

    fn initial_prompt(&self, input: AgentInput) -> PromptBuilder {
        let mut prompt = match input {
            AgentInput::Builder(builder) => builder,
            AgentInput::Text(text) => {
                let budget = self
                    .provider
                    .context_length()
                    .saturating_sub(self.reply_reserve);
                let tokenizer = Arc::new(ProviderTokenizer(self.provider.clone()));
                let mut builder = PromptBuilder::new(tokenizer, budget);
                builder.add_user(text, None);
                builder
            }
        };
        for block in self.guidance() {
            prompt.add_user(block, None);
        }
        prompt.add_user(format!("\n{NEXT_ACTION}"), None);
        prompt
    }

    /// Run one session to its end, narrating progress on `narration`.
    ///
    /// Malformed replies never surface here: they become feedback for the
    /// next attempt. Only a failing provider is an `Err`.
    pub async fn run(
        &mut self,
        input: AgentInput,
        cancel: &CancellationToken,
        narration: &mpsc::Sender<Narration>,
    ) -> Result<SessionOutcome> {
        let session_id = Uuid::new_v4();
        let provider = self.provider.clone();
        let multi_action = self.tools.has_terminal();
        let mut prompt = self.initial_prompt(input);

        let mut attempts_left = MAX_ATTEMPTS;
        let mut band: u32 = 1;
        let mut actions = 0usize;

        info!(
            %session_id,
            provider = provider.name(),
            tools = ?self.tools.names(),
            multi_action,
            "Starting agent session"
        );

        loop {
            if cancel.is_cancelled() {
                info!(%session_id, "Session cancelled");
                notify(narration, Narration::Cancelled).await;
                return Ok(SessionOutcome::Cancelled);
            }

            if attempts_left == 0 {
                warn!(%session_id, actions, "Retry budget exhausted");
                notify(narration, Narration::Exhausted).await;
                return Ok(SessionOutcome::Exhausted);
            }

            let messages = match prompt.build() {
                Ok(messages) => messages,
                Err(PromptError::Infeasible { tokens, budget }) => {
                    warn!(%session_id, tokens, budget, "Prompt cannot fit the model");
                    notify(narration, Narration::Infeasible { tokens, budget }).await;
                    return Ok(SessionOutcome::Infeasible);
                }
            };

            notify(
                narration,
                Narration::AttemptStarted {
                    remaining: attempts_left,
                },
            )
            .await;
            attempts_left -= 1;
            self.tools.reset_all();

            debug!(
                %session_id,
                attempt = MAX_ATTEMPTS - attempts_left,
                messages = messages.len(),
                tokens = prompt.total_tokens(),
                "Requesting reply"
            );

            let request = ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: u32::try_from(self.reply_reserve).ok(),
                stream: true,
                stop: vec![],
            };
            let rx = provider.stream(request).await?;

            let Some(attempt) = self
                .read_reply(LineStream::new(rx), cancel, narration)
                .await?
            else {
                info!(%session_id, "Session cancelled mid-reply");
                notify(narration, Narration::Cancelled).await;
                return Ok(SessionOutcome::Cancelled);
            };

            let status = attempt
                .selected
                .and_then(|index| self.tools.get(index))
                .map(|tool| tool.check_status());
            let failure = match (attempt.error, status) {
                (Some(error), _) => Some(error),
                (None, None) => {
                    notify(narration, Narration::NoToolSelected).await;
                    Some(
                        "No tool was selected, your reply must follow one of the formats above."
                            .to_string(),
                    )
                }
                (None, Some(StepResult::Error(message))) => {
                    notify(
                        narration,
                        Narration::ToolError {
                            message: message.clone(),
                        },
                    )
                    .await;
                    Some(message)
                }
                (None, Some(_)) => None,
            };

            if let Some(error) = failure {
                debug!(%session_id, band, error = %error, "Attempt failed");
                prompt.add_message(Role::Assistant, attempt.transcript, Some(band));
                prompt.add_message(
                    Role::User,
                    format!("Your reply has wrong format: {error} Please retry!"),
                    Some(band),
                );
                band += 1;
                continue;
            }

            let (tool_name, success, terminal) =
                match attempt.selected.and_then(|index| self.tools.get(index)) {
                    Some(tool) => (
                        tool.name().to_string(),
                        tool.success_message(),
                        tool.is_terminal(),
                    ),
                    None => continue,
                };
            actions += 1;

            info!(%session_id, tool = %tool_name, actions, "Action completed");
            notify(
                narration,
                Narration::ActionCompleted {
                    tool: tool_name,
                    message: success.clone(),
                },
            )
            .await;

            if !multi_action || terminal {
                info!(%session_id, actions, "Session finished");
                notify(narration, Narration::Succeeded).await;
                return Ok(SessionOutcome::Succeeded);
            }

            if actions >= MAX_ACTIONS {
                warn!(%session_id, actions, "Action cap reached without confirmation");
                notify(narration, Narration::Exhausted).await;
                return Ok(SessionOutcome::Exhausted);
            }

            // The completed turn, directive included, is one prunable band.
            prompt.add_message(Role::Assistant, attempt.transcript, Some(band));
            prompt.add_message(Role::User, success, Some(band));
            prompt.add_message(Role::User, NEXT_ACTION, Some(band));
            band += 1;
            attempts_left = MAX_ATTEMPTS;
        }
    }

    /// Feed one streamed reply through the tools. `None` if cancelled.
    async fn read_reply(
        &mut self,
        mut lines: LineStream,
        cancel: &CancellationToken,
        narration: &mpsc::Sender<Narration>,
    ) -> Result<Option<Attempt>> {
        let mut attempt = Attempt::default();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                next = lines.next_line() => next,
            };
            let Some(line) = next else {
                break;
            };
            let line = line?;

            attempt.transcript.push_str(&line);
            attempt.transcript.push('\n');

            // Keep collecting the transcript after a protocol error.
            if attempt.error.is_some() {
                continue;
            }

            if attempt.selected.is_none() {
                attempt.selected = self.tools.select(&line);
                let selected = attempt
                    .selected
                    .and_then(|i| self.tools.get(i))
                    .map(|tool| tool.name().to_string());
                if let Some(name) = selected {
                    debug!(tool = %name, "Tool selected");
                    notify(narration, Narration::ToolSelected { name }).await;
                }
            }

            let Some(tool) = attempt.selected.and_then(|i| self.tools.get_mut(i)) else {
                continue;
            };

            // A step chain can advance at most once per step on one line.
            for _ in 0..=tool.step_count() {
                match tool.run_step(&line).await {
                    StepResult::Break(message) => {
                        if !message.is_empty() {
                            notify(narration, Narration::StepMessage { message }).await;
                        }
                    }
                    StepResult::Error(message) => {
                        debug!(tool = tool.name(), step = tool.current_step(), "Protocol error");
                        notify(
                            narration,
                            Narration::ToolError {
                                message: message.clone(),
                            },
                        )
                        .await;
                        attempt.error = Some(message);
                        break;
                    }
                    StepResult::Continue | StepResult::Complete => break,
                }
            }
        }

        Ok(Some(attempt))
    }
}

/// Run a session in the background and stream its narration.
///
/// The stream ends when the session does; a provider failure is its last
/// item. Dropping the stream cancels the session.
pub fn run_agent(
    mut agent: AgentLoop,
    input: impl Into<AgentInput>,
    cancel: CancellationToken,
) -> ReceiverStream<Result<Narration>> {
    let input = input.into();
    let (tx, rx) = mpsc::channel(128);

    tokio::spawn(async move {
        let (events_tx, mut events_rx) = mpsc::channel::<Narration>(128);

        let forward_tx = tx.clone();
        let forward_cancel = cancel.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if forward_tx.send(Ok(event)).await.is_err() {
                    forward_cancel.cancel();
                    break;
                }
            }
        });

        let result = agent.run(input, &cancel, &events_tx).await;
        drop(events_tx);
        let _ = forward.await;

        if let Err(e) = result {
            warn!(error = %e, "Agent session failed");
            let _ = tx.send(Err(e)).await;
        }
    });

    ReceiverStream::new(rx)
}
