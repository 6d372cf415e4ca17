//! Markdown validation through markdownlint plus built-in rules.
//!
//! Whole-file writes lint the incoming content. For an `Edit`, only a
//! fragment of the updated file (the changed lines plus two lines of
//! context on each side) is linted, so the user is not forced to fix
//! pre-existing issues elsewhere in the file. The content goes to
//! markdownlint over stdin when the tool is installed; a small set of
//! built-in line rules runs either way.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::event::EventKind;
use crate::event::HookContext;
use crate::result::Finding;
use crate::result::ValidationResult;
use crate::validator::Category;
use crate::validator::Validator;
use crate::validator::ValidatorContext;

/// Lines of surrounding context kept when linting an edit fragment.
const CONTEXT_LINES: usize = 2;

const MARKDOWNLINT_RULES: &str =
    "https://github.com/DavidAnson/markdownlint/blob/main/doc/Rules.md";

/// One line of markdownlint output: `stdin:12:3 MD009/no-trailing-spaces ...`.
static LINT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^stdin:(\d+)(?::\d+)? (MD\d+)(?:/[A-Za-z0-9_-]+)* (.+)$")
        .expect("markdownlint output regex")
});

/// Content staged for linting.
struct LintInput {
    text: String,
    /// Fragments are mid-file excerpts; whole-file rules do not apply.
    fragment: bool,
}

/// Lints markdown about to be written. `Io` category: the heavy lifting
/// is a markdownlint subprocess.
#[derive(Debug, Default)]
pub struct MarkdownValidator;

#[async_trait]
impl Validator for MarkdownValidator {
    fn name(&self) -> &str {
        "validate-markdown"
    }

    fn category(&self) -> Category {
        Category::Io
    }

    async fn validate(&self, cx: &ValidatorContext, hook: &HookContext) -> ValidationResult {
        let Some(input) = lint_input(hook) else {
            return ValidationResult::pass();
        };
        if input.text.is_empty() {
            return ValidationResult::pass();
        }

        let mut findings = builtin_findings(&input);
        let mut references = Vec::new();

        if cx.caps.tools.is_available("markdownlint") {
            match cx
                .caps
                .runner
                .run_with_stdin(&cx.cancel, &hook.cwd, &input.text, "markdownlint", &["--stdin"])
                .await
            {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    // markdownlint reports findings on stderr.
                    let combined = format!("{}{}", output.stdout, output.stderr);
                    let parsed = parse_markdownlint(&combined);
                    if parsed.is_empty() {
                        findings.push(Finding::warning(format!(
                            "markdownlint exited with {} but produced no findings",
                            output.exit_code
                        )));
                    } else {
                        references.push(MARKDOWNLINT_RULES.to_string());
                        findings.extend(parsed);
                    }
                }
                Err(err) => {
                    findings.push(Finding::warning(format!(
                        "markdownlint could not be run: {err}"
                    )));
                }
            }
        } else {
            debug!("markdownlint not installed; running built-in rules only");
        }

        findings.sort_by_key(|f| (f.line.unwrap_or(u32::MAX), f.code.clone()));
        let mut result = ValidationResult::from_findings(findings);
        for reference in references {
            result = result.with_reference(reference);
        }
        result
    }
}

/// Resolve what to lint: incoming content for whole-file writes, an edit
/// fragment (read from the on-disk file) for edits, nothing otherwise.
fn lint_input(hook: &HookContext) -> Option<LintInput> {
    if let Some(content) = hook.input.content.as_deref() {
        return Some(LintInput {
            text: content.to_string(),
            fragment: false,
        });
    }

    if hook.event != EventKind::PreToolUse || !hook.tool.is_file_mutation() {
        return None;
    }

    let path = hook.input.file_path.as_deref()?;
    let old = hook.input.old_string.as_deref().filter(|s| !s.is_empty())?;
    let new = hook.input.new_string.as_deref().filter(|s| !s.is_empty())?;

    let original = match std::fs::read_to_string(path) {
        Ok(original) => original,
        Err(err) => {
            debug!(file = path, %err, "could not read file for edit validation");
            return None;
        }
    };

    let fragment = extract_edit_fragment(&original, old, new, CONTEXT_LINES)?;
    debug!(fragment_lines = fragment.lines().count(), "linting edit fragment");
    Some(LintInput {
        text: fragment,
        fragment: true,
    })
}

/// Apply the edit to `content` and return the changed lines with
/// `context` unchanged lines on each side. `None` when `old` does not
/// occur in the content.
fn extract_edit_fragment(content: &str, old: &str, new: &str, context: usize) -> Option<String> {
    let offset = content.find(old)?;
    let updated = content.replacen(old, new, 1);

    let start_line = content[..offset].matches('\n').count();
    let end_line = start_line + new.lines().count().max(1) - 1;

    let lines: Vec<&str> = updated.lines().collect();
    if lines.is_empty() {
        return Some(String::new());
    }
    let from = start_line.saturating_sub(context);
    let to = (end_line + context).min(lines.len() - 1);
    Some(lines[from..=to].join("\n"))
}

/// Built-in rules that run with or without markdownlint installed.
fn builtin_findings(input: &LintInput) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (index, line) in input.text.lines().enumerate() {
        let number = (index + 1) as u32;

        if line.starts_with('\t') {
            findings.push(
                Finding::warning("Tab indentation; markdown renderers expect spaces")
                    .with_line(number)
                    .with_code("FILE001")
                    .with_fix(line.replace('\t', "    ")),
            );
        }

        if line != line.trim_end() {
            findings.push(
                Finding::error("Trailing whitespace")
                    .with_line(number)
                    .with_code("FILE002")
                    .with_fix(line.trim_end().to_string()),
            );
        }
    }

    // A fragment is an excerpt; only whole files need a final newline.
    if !input.fragment && !input.text.ends_with('\n') {
        findings.push(Finding::error("File does not end with a newline").with_code("FILE003"));
    }

    findings
}

fn parse_markdownlint(output: &str) -> Vec<Finding> {
    LINT_LINE
        .captures_iter(output)
        .filter_map(|captures| {
            let line: u32 = captures[1].parse().ok()?;
            Some(
                Finding::error(captures[3].trim().to_string())
                    .with_line(line)
                    .with_code(&captures[2]),
            )
        })
        .collect()
}
