//! Priority-pruned prompt builder.
//!
//! Components are priced once, when added, and the running total is kept
//! incrementally. Building prunes whole priority bands, lowest first, until
//! the total fits the budget; components added without a priority are never
//! pruned. Same-role runs are merged in the built prompt.

use std::sync::Arc;
use stepwise_core::message::{Message, Role};
use stepwise_core::token::Tokenizer;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Prompt needs {tokens} tokens but only {budget} fit, and nothing is left to prune")]
    Infeasible { tokens: usize, budget: usize },
}

/// One fragment of the conversation.
#[derive(Debug, Clone)]
struct PromptComponent {
    message: Message,
    /// Never pruned.
    necessary: bool,
    /// Lower is pruned first. Meaningless when `necessary`.
    priority: u32,
    tokens: usize,
}

/// Accumulates prompt components under a fixed token budget.
#[derive(Clone)]
pub struct PromptBuilder {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
    total_tokens: usize,
    components: Vec<PromptComponent>,
}

impl PromptBuilder {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize) -> Self {
        Self {
            tokenizer,
            max_tokens,
            total_tokens: 0,
            components: Vec::new(),
        }
    }

    /// Append a component. `None` marks it necessary.
    pub fn add_message(&mut self, role: Role, text: impl Into<String>, priority: Option<u32>) {
        let message = Message::new(role, text);
        let tokens = self.tokenizer.count_tokens(&message.content);
        self.total_tokens += tokens;
        self.components.push(PromptComponent {
            message,
            necessary: priority.is_none(),
            priority: priority.unwrap_or(0),
            tokens,
        });
    }

    pub fn add_user(&mut self, text: impl Into<String>, priority: Option<u32>) {
        self.add_message(Role::User, text, priority);
    }

    pub fn add_assistant(&mut self, text: impl Into<String>, priority: Option<u32>) {
        self.add_message(Role::Assistant, text, priority);
    }

    /// Prune until the prompt fits, then merge same-role runs.
    ///
    /// Pruning is permanent: later builds start from what is left.
    pub fn build(&mut self) -> Result<Vec<Message>, PromptError> {
        while self.total_tokens > self.max_tokens {
            let Some(lowest) = self
                .components
                .iter()
                .filter(|c| !c.necessary)
                .map(|c| c.priority)
                .min()
            else {
                return Err(PromptError::Infeasible {
                    tokens: self.total_tokens,
                    budget: self.max_tokens,
                });
            };

            let before = self.components.len();
            let mut freed = 0;
            self.components.retain(|c| {
                let pruned = !c.necessary && c.priority == lowest;
                if pruned {
                    freed += c.tokens;
                }
                !pruned
            });
            self.total_tokens -= freed;
            debug!(
                priority = lowest,
                removed = before - self.components.len(),
                tokens = self.total_tokens,
                budget = self.max_tokens,
                "Pruned prompt band"
            );
        }

        Ok(self.merged())
    }

    fn merged(&self) -> Vec<Message> {
        let mut prompt: Vec<Message> = Vec::with_capacity(self.components.len());
        for component in &self.components {
            match prompt.last_mut() {
                Some(last) if last.role == component.message.role => {
                    last.content.push('\n');
                    last.content.push_str(&component.message.content);
                }
                _ => prompt.push(component.message.clone()),
            }
        }
        prompt
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn budget(&self) -> usize {
        self.max_tokens
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl std::fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptBuilder")
            .field("max_tokens", &self.max_tokens)
            .field("total_tokens", &self.total_tokens)
            .field("components", &self.components.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per word.
    struct Words;

    impl Tokenizer for Words {
        fn count_tokens(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn builder(max: usize) -> PromptBuilder {
        PromptBuilder::new(Arc::new(Words), max)
    }

    #[test]
    fn fitting_prompt_merges_same_role_runs() {
        let mut b = builder(100);
        b.add_user("a b", None);
        b.add_user("c", Some(1));
        b.add_assistant("d", Some(1));
        b.add_user("e", None);
        let prompt = b.build().unwrap();
        assert_eq!(prompt.len(), 3);
        assert_eq!(prompt[0].content, "a b\nc");
        assert_eq!(prompt[1].role, Role::Assistant);
        assert_eq!(prompt[2].content, "e");
        assert_eq!(b.total_tokens(), 5);
    }

    #[test]
    fn all_necessary_over_budget_is_infeasible() {
        let mut b = builder(3);
        b.add_user("one two", None);
        b.add_assistant("three four", None);
        assert_eq!(
            b.build().unwrap_err(),
            PromptError::Infeasible {
                tokens: 4,
                budget: 3
            }
        );
    }

    #[test]
    fn lowest_band_is_pruned_as_a_whole() {
        let mut b = builder(6);
        b.add_user("task words here", None);
        b.add_assistant("old reply", Some(1));
        b.add_user("old feedback", Some(1));
        b.add_assistant("new reply", Some(2));
        b.add_user("new feedback", Some(2));
        assert_eq!(b.total_tokens(), 11);

        // Dropping band 1 still leaves 7 > 6, so band 2 goes as well.
        let prompt = b.build().unwrap();
        assert_eq!(prompt.len(), 1);
        assert_eq!(b.total_tokens(), 3);
    }

    #[test]
    fn pruning_stops_as_soon_as_it_fits() {
        let mut b = builder(8);
        b.add_user("task", None);
        b.add_assistant("old reply here", Some(1));
        b.add_user("old", Some(1));
        b.add_assistant("new reply", Some(2));
        b.add_user("new feedback", Some(2));
        let prompt = b.build().unwrap();
        assert!(b.total_tokens() <= b.budget());
        let text: Vec<&str> = prompt.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(text, vec!["task", "new reply", "new feedback"]);
    }

    #[test]
    fn necessary_components_survive_pruning() {
        let mut b = builder(2);
        b.add_user("keep me", None);
        b.add_user("drop", Some(0));
        let prompt = b.build().unwrap();
        assert_eq!(prompt[0].content, "keep me");
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn infeasible_after_pruning_everything_prunable() {
        let mut b = builder(1);
        b.add_user("x y", None);
        b.add_user("z", Some(5));
        assert!(matches!(
            b.build(),
            Err(PromptError::Infeasible { tokens: 2, budget: 1 })
        ));
    }
}
