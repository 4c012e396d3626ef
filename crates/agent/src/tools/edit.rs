//! Edit tool: replace a bounded line range of one file.
//!
//! The model has to restate the bounds, declare the range it edits, quote the
//! current code of that range verbatim and finally write the replacement:
//!
//! ```text
//! 1. I'll only edit lines that require changes.
//! 2. I'll only edit inside lines 3-10.
//! 3. With those in mind, I choose to edit lines 4-5.
//! 4. Before edit, the code in lines 4-5 is:
//! (fenced code)
//! 5. After editing to "rename x", the code will be:
//! (fenced code)
//! ```
//!
//! The quoted "before" code is checked against the real file, so a model that
//! misremembers the code is sent back with the real lines instead of
//! producing a corrupt edit.

use async_trait::async_trait;
use regex::{Captures, Regex, RegexBuilder};
use std::sync::Arc;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{StepResult, Tool};
use tracing::debug;

use crate::line_number::{add_line_numbers, remove_line_numbers};
use crate::prompt::EditRequest;
use crate::steps::{Step, StepHandler, StepSequence, literal_regex};

/// Receives a full file text: the reconstruction while replacement code
/// grows, or the committed file once an edit is stored.
pub type PreviewFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Immutable parameters of an edit session.
#[derive(Clone)]
pub struct EditParams {
    /// What the edit should achieve, in the user's words.
    pub request: String,
    /// First editable line, 1-based.
    pub bound_start: usize,
    /// Last editable line, inclusive.
    pub bound_end: usize,
    pub file_content: String,
    pub preview: PreviewFn,
    /// Called with the new file content after every stored edit.
    pub on_commit: PreviewFn,
}

impl EditParams {
    pub fn new(
        request: impl Into<String>,
        bound_start: usize,
        bound_end: usize,
        file_content: impl Into<String>,
    ) -> Self {
        Self {
            request: request.into(),
            bound_start,
            bound_end,
            file_content: file_content.into(),
            preview: Arc::new(|_| {}),
            on_commit: Arc::new(|_| {}),
        }
    }

    /// Parameters for editing exactly what `request` describes.
    pub fn from_request(request: &EditRequest) -> Self {
        Self::new(
            request.request.clone(),
            request.bound_start,
            request.bound_end,
            request.file_content.clone(),
        )
    }

    pub fn with_preview(mut self, preview: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.preview = Arc::new(preview);
        self
    }

    pub fn with_commit(mut self, on_commit: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_commit = Arc::new(on_commit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditAction {
    DeclareRange,
    ConfirmRange,
    CodeBefore,
    VerifyBefore,
    CodeAfter,
    Commit,
}

const ONLY_REQUIRED: &str = "I'll only edit lines that require changes.";

fn inside_bounds(start: usize, end: usize) -> String {
    format!("I'll only edit inside lines {start}-{end}.")
}

/// Compiled once per tool; steps are rebuilt from clones on every reset.
struct EditPatterns {
    only_required: Regex,
    inside_bounds: Regex,
    declare_range: Regex,
    confirm_range: Regex,
    after_edit: Regex,
}

impl EditPatterns {
    fn compile(params: &EditParams) -> Result<Self, regex::Error> {
        let sentence = |pattern: &str| RegexBuilder::new(pattern).case_insensitive(true).build();
        Ok(Self {
            only_required: literal_regex(ONLY_REQUIRED)?,
            inside_bounds: literal_regex(&inside_bounds(params.bound_start, params.bound_end))?,
            declare_range: sentence(r"With those in mind, I choose to edit lines (\d+)-(\d+)")?,
            confirm_range: sentence(r"Before edit, the code in lines (\d+)-(\d+) is")?,
            after_edit: literal_regex(&format!(
                "After editing to \"{}\", the code will be",
                params.request
            ))?,
        })
    }
}

/// Everything the steps read and write.
struct EditState {
    request: String,
    bound_start: usize,
    bound_end: usize,
    preview: PreviewFn,
    on_commit: PreviewFn,

    // Survives resets: a committed edit is the base of the next action.
    file_content: String,

    range_start: usize,
    range_end: usize,
    code_before: String,
    code_after: String,
}

impl EditState {
    fn clear_attempt(&mut self) {
        self.range_start = 0;
        self.range_end = 0;
        self.code_before.clear();
        self.code_after.clear();
    }

    /// Real lines `range_start..=range_end`, clamped to the file.
    fn reference_code(&self) -> String {
        let lines: Vec<&str> = self.file_content.split('\n').collect();
        let (start, end) = clamp_range(self.range_start, self.range_end, lines.len());
        lines[start..end].join("\n").trim_end().to_string()
    }

    /// File with the declared range replaced by the replacement code so far.
    fn edited_code(&self) -> String {
        let lines: Vec<&str> = self.file_content.split('\n').collect();
        let (start, end) = clamp_range(self.range_start, self.range_end, lines.len());

        let mut edited: Vec<&str> = lines[..start].to_vec();
        if !self.code_after.is_empty() {
            let after = self
                .code_after
                .strip_suffix('\n')
                .unwrap_or(&self.code_after);
            edited.extend(after.split('\n'));
        }
        edited.extend_from_slice(&lines[end..]);
        edited.join("\n")
    }

    fn declare_range(&mut self, captures: &Captures<'_>) -> StepResult {
        let (Ok(start), Ok(end)) = (captures[1].parse::<usize>(), captures[2].parse::<usize>())
        else {
            return StepResult::Error(format!(
                "Lines {}-{} are not a valid range! Please provide a valid range!",
                &captures[1], &captures[2]
            ));
        };
        self.range_start = start;
        self.range_end = end;

        if start < self.bound_start || end > self.bound_end || start > end {
            return StepResult::Error(format!(
                "You want to edit lines {start}-{end}, but it's invalid because you can only edit between {}-{}! Please provide a valid range!",
                self.bound_start, self.bound_end
            ));
        }
        StepResult::Break(format!("Got edit range: {start}-{end}!"))
    }

    fn confirm_range(&self, captures: &Captures<'_>) -> StepResult {
        match (captures[1].parse::<usize>(), captures[2].parse::<usize>()) {
            (Ok(start), Ok(end)) if start == self.range_start && end == self.range_end => {
                StepResult::Break("Edit range is confirmed!".into())
            }
            _ => StepResult::Error(format!(
                "You quoted lines {}-{} as the code before edit, but it's unaccepted because you want to edit {}-{}! Please quote range consistently!",
                &captures[1], &captures[2], self.range_start, self.range_end
            )),
        }
    }

    fn verify_before(&mut self) -> StepResult {
        let reference = self.reference_code();
        self.code_before = format_indent(&remove_line_numbers(&self.code_before), &reference)
            .trim_end()
            .to_string();

        if trim_lines(&self.code_before) != trim_lines(&reference) {
            debug!(
                range_start = self.range_start,
                range_end = self.range_end,
                "Quoted code differs from file"
            );
            return StepResult::Error(format!(
                "You replied that the code in {}-{} is:\n\n```\n{}\n```\n\nIt's not accepted because it's inconsistent with the real code:\n\n```\n{}\n```\n\nPlease provide the correct code before edit!",
                self.range_start, self.range_end, self.code_before, reference
            ));
        }
        StepResult::Break("Code before edit is consistent with real code!".into())
    }
}

#[async_trait]
impl StepHandler for EditState {
    type Action = EditAction;

    fn on_match(&mut self, action: EditAction, captures: &Captures<'_>) -> StepResult {
        match action {
            EditAction::DeclareRange => self.declare_range(captures),
            EditAction::ConfirmRange => self.confirm_range(captures),
            _ => StepResult::advance(),
        }
    }

    fn on_code_line(&mut self, action: EditAction, line: &str) {
        match action {
            EditAction::CodeBefore => {
                self.code_before.push_str(line);
                self.code_before.push('\n');
            }
            EditAction::CodeAfter => {
                self.code_after
                    .push_str(remove_line_numbers(line).trim_end());
                self.code_after.push('\n');
                (self.preview)(&self.edited_code());
            }
            _ => {}
        }
    }

    async fn on_assert(&mut self, action: EditAction) -> StepResult {
        match action {
            EditAction::VerifyBefore => self.verify_before(),
            EditAction::Commit => {
                self.file_content = self.edited_code();
                (self.on_commit)(&self.file_content);
                StepResult::Break("Stored edited code!".into())
            }
            _ => StepResult::advance(),
        }
    }
}

/// 0-based half-open slice bounds for a 1-based inclusive range.
fn clamp_range(start: usize, end: usize, len: usize) -> (usize, usize) {
    let start = start.saturating_sub(1).min(len);
    let end = end.min(len).max(start);
    (start, end)
}

fn trim_lines(code: &str) -> String {
    code.trim_end()
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Take each line's indentation from `reference` when both have the same
/// number of lines; otherwise return `code` untouched.
pub fn format_indent(code: &str, reference: &str) -> String {
    let code_lines: Vec<&str> = code.trim_end().split('\n').collect();
    let ref_lines: Vec<&str> = reference.trim_end().split('\n').collect();
    if code_lines.len() != ref_lines.len() {
        return code.to_string();
    }

    code_lines
        .iter()
        .zip(&ref_lines)
        .map(|(line, reference)| {
            let indent_len = reference.len() - reference.trim_start().len();
            format!("{}{}", &reference[..indent_len], line.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tool that edits `bound_start..=bound_end` of a file.
pub struct EditTool {
    state: EditState,
    patterns: EditPatterns,
    sequence: StepSequence<EditAction>,
}

impl EditTool {
    pub fn new(params: EditParams) -> Result<Self, ToolError> {
        if params.bound_start == 0 || params.bound_start > params.bound_end {
            return Err(ToolError::InvalidParameters(format!(
                "invalid edit bounds {}-{}",
                params.bound_start, params.bound_end
            )));
        }
        let patterns = EditPatterns::compile(&params)
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))?;

        let mut tool = Self {
            state: EditState {
                request: params.request,
                bound_start: params.bound_start,
                bound_end: params.bound_end,
                preview: params.preview,
                on_commit: params.on_commit,
                file_content: params.file_content,
                range_start: 0,
                range_end: 0,
                code_before: String::new(),
                code_after: String::new(),
            },
            patterns,
            sequence: StepSequence::new(Vec::new()),
        };
        tool.reset();
        Ok(tool)
    }

    /// File content including every committed edit.
    pub fn file_content(&self) -> &str {
        &self.state.file_content
    }

    /// Range declared in the current attempt, `(0, 0)` before declaration.
    pub fn range(&self) -> (usize, usize) {
        (self.state.range_start, self.state.range_end)
    }

    fn build_steps(&self) -> Vec<Step<EditAction>> {
        let p = &self.patterns;
        let s = &self.state;
        vec![
            Step::literal("1.", p.only_required.clone(), ONLY_REQUIRED),
            Step::literal(
                "2.",
                p.inside_bounds.clone(),
                &inside_bounds(s.bound_start, s.bound_end),
            ),
            Step::pattern(
                "3.",
                p.declare_range.clone(),
                "3. With those in mind, I choose to edit lines X-Y.",
                Some(EditAction::DeclareRange),
            ),
            Step::pattern(
                "4.",
                p.confirm_range.clone(),
                "4. Before edit, the code in lines X-Y is:",
                Some(EditAction::ConfirmRange),
            ),
            Step::code_block(EditAction::CodeBefore),
            Step::assert(EditAction::VerifyBefore, "the code before edit was checked"),
            Step::pattern(
                "5.",
                p.after_edit.clone(),
                format!("5. After editing to \"{}\", the code will be:", s.request),
                None,
            ),
            Step::code_block(EditAction::CodeAfter),
            Step::assert(EditAction::Commit, "the edited code was stored"),
        ]
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn intent(&self) -> String {
        "edit the code".into()
    }

    fn format(&self) -> String {
        format!(
            "1. I'll only edit lines that require changes.\n\
             2. I'll only edit inside lines {}-{}.\n\
             3. With those in mind, I choose to edit lines X-Y.\n\
             4. Before edit, the code in lines X-Y is:\n\n\
             ```\n(code)\n```\n\n\
             5. After editing to \"{}\", the code will be:\n\n\
             ```\n(code)\n```\n",
            self.state.bound_start, self.state.bound_end, self.state.request
        )
    }

    fn prefix(&self) -> &str {
        "1. I'll only edit"
    }

    fn reset(&mut self) {
        self.state.clear_attempt();
        self.sequence = StepSequence::new(self.build_steps());
    }

    fn current_step(&self) -> usize {
        self.sequence.current()
    }

    fn step_count(&self) -> usize {
        self.sequence.len()
    }

    async fn run_step(&mut self, line: &str) -> StepResult {
        self.sequence.run(&mut self.state, line).await
    }

    fn check_status(&self) -> StepResult {
        self.sequence.check_status()
    }

    fn success_message(&self) -> String {
        format!(
            "Successfully edited lines {}-{}!\n\nCurrent code is:\n\n```\n{}\n```\n",
            self.state.range_start,
            self.state.range_end,
            add_line_numbers(&self.state.file_content)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn ten_lines() -> String {
        (1..=10)
            .map(|i| {
                if (4..=9).contains(&i) {
                    format!("    line {i}")
                } else {
                    format!("line {i}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn tool(bounds: (usize, usize)) -> EditTool {
        EditTool::new(EditParams::new("rename", bounds.0, bounds.1, ten_lines())).unwrap()
    }

    /// Feed `reply` the way the agent loop does: a `Break` re-feeds the same
    /// line, anything else moves on. Returns the first error, if any.
    async fn drive(tool: &mut EditTool, reply: &str) -> Option<String> {
        for line in reply.split('\n') {
            for _ in 0..=tool.step_count() {
                match tool.run_step(line).await {
                    StepResult::Break(_) => continue,
                    StepResult::Error(msg) => return Some(msg),
                    _ => break,
                }
            }
        }
        None
    }

    fn reply(range: &str, before: &str, after: &str) -> String {
        format!(
            "Sure.\n1. I'll only edit lines that require changes.\n\
             2. I'll only edit inside lines 3-10.\n\
             3. With those in mind, I choose to edit lines {range}.\n\
             4. Before edit, the code in lines {range} is:\n\n```\n{before}\n```\n\n\
             5. After editing to \"rename\", the code will be:\n\n```\n{after}\n```\n"
        )
    }

    async fn run_prefix(tool: &mut EditTool, line3: &str) -> StepResult {
        tool.run_step("1. I'll only edit lines that require changes.").await;
        tool.run_step("2. I'll only edit inside lines 3-10.").await;
        tool.run_step(line3).await
    }

    #[tokio::test]
    async fn range_outside_bounds_is_rejected() {
        let mut t = tool((3, 10));
        match run_prefix(&mut t, "3. With those in mind, I choose to edit lines 2-5.").await {
            StepResult::Error(msg) => {
                assert!(msg.contains("2-5"));
                assert!(msg.contains("3-10"));
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(t.current_step(), 2);
    }

    #[tokio::test]
    async fn range_inside_bounds_breaks() {
        let mut t = tool((3, 10));
        assert_eq!(
            run_prefix(&mut t, "3. With those in mind, I choose to edit lines 4-9.").await,
            StepResult::Break("Got edit range: 4-9!".into())
        );
        assert_eq!(t.range(), (4, 9));
        assert_eq!(t.current_step(), 3);
    }

    #[tokio::test]
    async fn inverted_and_oversized_ranges_are_errors() {
        let mut t = tool((3, 10));
        assert!(
            run_prefix(&mut t, "3. With those in mind, I choose to edit lines 6-4.")
                .await
                .is_error()
        );
        let mut t = tool((3, 10));
        assert!(
            run_prefix(
                &mut t,
                "3. With those in mind, I choose to edit lines 4-99999999999999999999999."
            )
            .await
            .is_error()
        );
    }

    #[tokio::test]
    async fn inconsistent_confirmation_is_an_error() {
        let mut t = tool((3, 10));
        run_prefix(&mut t, "3. With those in mind, I choose to edit lines 4-5.").await;
        match t.run_step("4. Before edit, the code in lines 4-6 is:").await {
            StepResult::Error(msg) => assert!(msg.contains("4-6")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn quoting_real_code_with_or_without_numbers_is_accepted() {
        let before = (4..=9)
            .map(|i| format!("    line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut t = tool((3, 10));
        assert_eq!(drive(&mut t, &reply("4-9", &before, "x")).await, None);
        assert!(t.is_complete());

        let numbered = (4..=9)
            .map(|i| format!("{i} |     line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut t = tool((3, 10));
        assert_eq!(drive(&mut t, &reply("4-9", &numbered, "x")).await, None);
        assert!(t.is_complete());
    }

    #[tokio::test]
    async fn quoting_an_altered_line_is_rejected_with_real_code() {
        let mut t = tool((3, 10));
        let err = drive(&mut t, &reply("4-5", "    line 4\n    line five", "x"))
            .await
            .unwrap();
        assert!(err.contains("inconsistent with the real code"));
        assert!(err.contains("    line 5"));
        assert_eq!(t.current_step(), 5);
    }

    #[tokio::test]
    async fn indentation_is_taken_from_the_file() {
        let mut t = tool((3, 10));
        assert_eq!(
            drive(&mut t, &reply("4-5", "line 4\n\tline 5  ", "x")).await,
            None
        );
    }

    #[tokio::test]
    async fn commit_replaces_range_and_previews_growth() {
        let previews = Arc::new(Mutex::new(Vec::new()));
        let sink = previews.clone();
        let params = EditParams::new("rename", 3, 10, ten_lines())
            .with_preview(move |code| sink.lock().unwrap().push(code.to_string()));
        let mut t = EditTool::new(params).unwrap();

        let err = drive(
            &mut t,
            &reply("4-5", "    line 4\n    line 5", "    four\n    five\n    extra"),
        )
        .await;
        assert_eq!(err, None);

        let previews = previews.lock().unwrap();
        assert_eq!(previews.len(), 3);
        assert!(previews[0].contains("    four\n    line 6"));

        let lines: Vec<&str> = t.file_content().split('\n').collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[3], "    four");
        assert_eq!(lines[5], "    extra");
        assert_eq!(lines[6], "    line 6");
        assert_eq!(previews.last().unwrap(), t.file_content());
        assert!(t.success_message().starts_with("Successfully edited lines 4-5!"));
        assert!(t.success_message().contains(" 4 |     four"));
    }

    #[tokio::test]
    async fn commit_hook_sees_only_stored_edits() {
        let previews = Arc::new(Mutex::new(Vec::new()));
        let commits = Arc::new(Mutex::new(Vec::new()));
        let (preview_sink, commit_sink) = (previews.clone(), commits.clone());
        let params = EditParams::new("rename", 3, 10, ten_lines())
            .with_preview(move |code| preview_sink.lock().unwrap().push(code.to_string()))
            .with_commit(move |code| commit_sink.lock().unwrap().push(code.to_string()));
        let mut t = EditTool::new(params).unwrap();

        // Replacement block never closed: previewed, not stored.
        let full = reply("4-5", "    line 4\n    line 5", "GARBAGE");
        let unclosed = full.strip_suffix("```\n").unwrap();
        assert_eq!(drive(&mut t, unclosed).await, None);
        assert!(t.check_status().is_error());
        assert!(previews.lock().unwrap().last().unwrap().contains("GARBAGE"));
        assert!(commits.lock().unwrap().is_empty());
        assert_eq!(t.file_content(), ten_lines());

        t.reset();
        let good = reply("4-5", "    line 4\n    line 5", "    four");
        assert_eq!(drive(&mut t, &good).await, None);
        let commits = commits.lock().unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0], t.file_content());
        assert!(!commits[0].contains("GARBAGE"));
    }

    #[tokio::test]
    async fn empty_replacement_deletes_the_range() {
        let mut t = tool((3, 10));
        let text = "1. I'll only edit lines that require changes.\n\
             2. I'll only edit inside lines 3-10.\n\
             3. With those in mind, I choose to edit lines 4-5.\n\
             4. Before edit, the code in lines 4-5 is:\n```\n    line 4\n    line 5\n```\n\
             5. After editing to \"rename\", the code will be:\n```\n```";
        assert_eq!(drive(&mut t, text).await, None);
        assert!(t.is_complete());
        assert_eq!(t.file_content().split('\n').count(), 8);
        assert!(!t.file_content().contains("line 4"));
    }

    #[tokio::test]
    async fn range_past_end_of_file_is_clamped() {
        let mut t = EditTool::new(EditParams::new("grow", 1, 20, "a\nb")).unwrap();
        let text = "1. I'll only edit lines that require changes.\n\
             2. I'll only edit inside lines 1-20.\n\
             3. With those in mind, I choose to edit lines 2-15.\n\
             4. Before edit, the code in lines 2-15 is:\n```\nb\n```\n\
             5. After editing to \"grow\", the code will be:\n```\nb\nc\n```";
        assert_eq!(drive(&mut t, text).await, None);
        assert_eq!(t.file_content(), "a\nb\nc");
    }

    #[tokio::test]
    async fn reset_drops_attempt_state_but_keeps_committed_code() {
        let mut t = tool((3, 10));
        drive(&mut t, &reply("4-4", "    line 4", "    four")).await;
        assert!(t.is_complete());

        t.reset();
        assert_eq!(t.current_step(), 0);
        assert_eq!(t.range(), (0, 0));
        assert!(t.file_content().contains("    four"));

        // The next attempt validates against the committed content.
        let err = drive(&mut t, &reply("4-4", "    line 4", "    again")).await;
        assert!(err.unwrap().contains("    four"));
    }

    #[tokio::test]
    async fn unfinished_reply_reports_pending_step() {
        let mut t = tool((3, 10));
        run_prefix(&mut t, "3. With those in mind, I choose to edit lines 4-5.").await;
        match t.check_status() {
            StepResult::Error(msg) => assert!(msg.contains("4. Before edit")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn format_indent_only_applies_to_equal_line_counts() {
        assert_eq!(format_indent("a\n  b", "  x\n    y"), "  a\n    b");
        assert_eq!(format_indent("a\nb\nc", "  x"), "a\nb\nc");
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        assert!(EditTool::new(EditParams::new("r", 0, 3, "x")).is_err());
        assert!(EditTool::new(EditParams::new("r", 5, 3, "x")).is_err());
    }

    #[test]
    fn format_restates_bounds_and_request() {
        let t = tool((3, 10));
        let format = t.format();
        assert!(format.contains("2. I'll only edit inside lines 3-10."));
        assert!(format.contains("5. After editing to \"rename\""));
        assert!(format.contains("```\n(code)\n```"));
    }
}
