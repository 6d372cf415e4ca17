//! Shell script validation through shellcheck.
//!
//! The written content goes into a scratch file and shellcheck's JSON
//! output maps to line findings. A missing shellcheck binary is not an
//! error (the check is simply skipped). Shellcheck exiting nonzero with
//! findings is a validation result; exiting nonzero without findings is
//! a tool error and degrades to a warning.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::event::HookContext;
use crate::result::Finding;
use crate::result::ValidationResult;
use crate::validator::Category;
use crate::validator::Validator;
use crate::validator::ValidatorContext;

const SHELLCHECK_WIKI: &str = "https://www.shellcheck.net/wiki";

/// One entry of `shellcheck -f json` output.
#[derive(Debug, Deserialize)]
struct ShellcheckFinding {
    line: u32,
    level: String,
    code: u32,
    message: String,
}

/// Runs shellcheck over shell scripts about to be written.
#[derive(Debug, Default)]
pub struct ShellScriptValidator;

#[async_trait]
impl Validator for ShellScriptValidator {
    fn name(&self) -> &str {
        "validate-shell"
    }

    fn category(&self) -> Category {
        Category::Io
    }

    async fn validate(&self, cx: &ValidatorContext, hook: &HookContext) -> ValidationResult {
        let Some(content) = hook.input.written_content() else {
            return ValidationResult::pass();
        };

        if !cx.caps.tools.is_available("shellcheck") {
            debug!("shellcheck not installed; skipping shell validation");
            return ValidationResult::pass();
        }

        let scratch = match cx.caps.temp.create("klack-", ".sh", content) {
            Ok(scratch) => scratch,
            Err(err) => {
                return ValidationResult::warn(format!("could not stage script for shellcheck: {err}"));
            }
        };

        let path = scratch.path().display().to_string();
        let output = match cx
            .caps
            .runner
            .run(&cx.cancel, &hook.cwd, "shellcheck", &["-f", "json", &path])
            .await
        {
            Ok(output) => output,
            Err(err) => {
                return ValidationResult::warn(format!("shellcheck could not be run: {err}"));
            }
        };

        if output.success() {
            return ValidationResult::pass();
        }

        let Ok(parsed) = serde_json::from_str::<Vec<ShellcheckFinding>>(output.stdout.trim())
        else {
            // Nonzero exit without findings: the tool itself failed.
            return ValidationResult::warn(format!(
                "shellcheck exited with {} but produced no findings",
                output.exit_code
            ));
        };

        let mut findings = Vec::new();
        let mut references = Vec::new();
        for item in parsed {
            let code = format!("SC{}", item.code);
            let reference = format!("{SHELLCHECK_WIKI}/{code}");
            if !references.contains(&reference) {
                references.push(reference);
            }
            let finding = match item.level.as_str() {
                "error" => Finding::error(item.message),
                "warning" => Finding::warning(item.message),
                _ => Finding::info(item.message),
            };
            findings.push(finding.with_line(item.line).with_code(code));
        }

        let mut result = ValidationResult::from_findings(findings);
        for reference in references {
            result = result.with_reference(reference);
        }
        result
    }
}
