//! Initial instruction of an edit session.
//!
//! The file is quoted with line numbers. When the quote is too large for the
//! model, lines outside the editable bounds are dropped, from the end of the
//! file first, then from its start. Kept lines keep their real numbers.

use stepwise_config::EditSettings;
use stepwise_core::error::ToolError;
use stepwise_core::token::Tokenizer;
use tracing::debug;

use crate::line_number::add_line_numbers;

/// What to edit and where.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub request: String,
    pub bound_start: usize,
    pub bound_end: usize,
    pub file_content: String,
}

impl EditRequest {
    /// Validate and trim the request.
    pub fn new(
        request: &str,
        bound_start: usize,
        bound_end: usize,
        file_content: impl Into<String>,
    ) -> Result<Self, ToolError> {
        let request = request.trim();
        if request.is_empty() {
            return Err(ToolError::InvalidParameters(
                "Please provide a request, for example \"implement this function\"".into(),
            ));
        }
        if bound_start == 0 || bound_start > bound_end {
            return Err(ToolError::InvalidParameters(format!(
                "lines {bound_start}-{bound_end} are not a valid range"
            )));
        }
        Ok(Self {
            request: request.to_string(),
            bound_start,
            bound_end,
            file_content: file_content.into(),
        })
    }
}

fn render(code: &str, req: &EditRequest) -> String {
    format!(
        "You are an autonomous programmer. Below is some code for you to edit:\n\n```\n{code}\n```\n\nYour task is to edit between lines {}-{}, in order to \"{}\".",
        req.bound_start, req.bound_end, req.request
    )
}

/// Render the edit instruction, shrinking the quoted file to leave room for
/// tool guidance and the rest of the conversation.
pub fn build_edit_context(
    tokenizer: &dyn Tokenizer,
    context_length: usize,
    settings: &EditSettings,
    req: &EditRequest,
) -> String {
    let numbered = add_line_numbers(&req.file_content);
    let lines: Vec<&str> = numbered.split('\n').collect();

    let reserved = settings.function_buffer_tokens
        + (context_length as f64 * f64::from(settings.reserve_ratio)) as usize;
    let fits = |tokens: usize| tokens + reserved <= context_length;

    let mut tokens = tokenizer.count_tokens(&render(&numbered, req));
    let mut start = 0;
    let mut end = lines.len();

    let keep_end = req.bound_end.min(lines.len());
    let keep_start = req.bound_start.saturating_sub(1).min(keep_end);

    while !fits(tokens) && end > keep_end {
        end -= 1;
        tokens = tokens.saturating_sub(tokenizer.count_tokens(lines[end]));
    }
    while !fits(tokens) && start < keep_start {
        tokens = tokens.saturating_sub(tokenizer.count_tokens(lines[start]));
        start += 1;
    }

    if start > 0 || end < lines.len() {
        debug!(
            kept_from = start + 1,
            kept_to = end,
            total = lines.len(),
            tokens,
            "Shrunk edit context"
        );
    }
    render(&lines[start..end].join("\n"), req)
}
