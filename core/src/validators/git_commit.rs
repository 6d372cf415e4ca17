//! Commit command validation: signing flags and conventional messages.

use async_trait::async_trait;

use super::commit_msg;
use crate::event::HookContext;
use crate::result::ValidationResult;
use crate::shell::GitInvocation;
use crate::shell::git_invocations;
use crate::validator::Category;
use crate::validator::Validator;
use crate::validator::ValidatorContext;

/// Rejects `git commit` invocations that skip the signing flags or use a
/// non-conventional message.
#[derive(Debug, Default)]
pub struct CommitValidator;

#[async_trait]
impl Validator for CommitValidator {
    fn name(&self) -> &str {
        "validate-commit"
    }

    fn category(&self) -> Category {
        Category::Cpu
    }

    async fn validate(&self, _cx: &ValidatorContext, hook: &HookContext) -> ValidationResult {
        let Some(command) = hook.command() else {
            return ValidationResult::pass();
        };

        for invocation in git_invocations(command) {
            if invocation.subcommand != "commit" {
                continue;
            }
            let result = check_commit(&invocation);
            if !result.passed() {
                return result;
            }
        }

        ValidationResult::pass()
    }
}

fn check_commit(invocation: &GitInvocation) -> ValidationResult {
    if !has_signing_flags(invocation) {
        return ValidationResult::fail_with_code(
            "GIT010",
            "Add -sS flags to your commit command (sign-off and GPG signature are required)",
            Some("git commit -sS ...".to_string()),
            None,
        );
    }

    let Some(message) = invocation
        .flag_value("-m")
        .or_else(|| invocation.flag_value("--message"))
    else {
        // Editor-composed and amend-without-message commits are validated
        // post-hoc by repository tooling, not here.
        return ValidationResult::pass();
    };

    check_message(message)
}

fn check_message(message: &str) -> ValidationResult {
    let title = commit_msg::title_of(message);

    if commit_msg::is_revert(title) {
        return ValidationResult::pass();
    }

    if title.chars().count() > commit_msg::MAX_TITLE_LEN {
        return ValidationResult::fail_with_code(
            "GIT003",
            format!(
                "Commit title is {} characters; keep it at or under {}",
                title.chars().count(),
                commit_msg::MAX_TITLE_LEN
            ),
            Some("Shorten the title; move detail into the body".to_string()),
            None,
        );
    }

    let Some(parsed) = commit_msg::parse_title(title) else {
        return ValidationResult::fail_with_code(
            "GIT001",
            "Commit message does not follow conventional format: type(scope): description",
            Some("git commit -sS -m \"feat(scope): describe the change\"".to_string()),
            None,
        );
    };

    if !commit_msg::DEFAULT_TYPES.contains(&parsed.kind.as_str()) {
        return ValidationResult::fail_with_code(
            "GIT002",
            format!(
                "Unknown commit type `{}`; use one of: {}",
                parsed.kind,
                commit_msg::DEFAULT_TYPES.join(", ")
            ),
            None,
            None,
        );
    }

    ValidationResult::pass()
}

fn has_signing_flags(invocation: &GitInvocation) -> bool {
    let mut signoff = invocation.has_flag("--signoff");
    let mut gpg_sign = invocation.has_flag("--gpg-sign")
        || invocation.rest.iter().any(|w| w.starts_with("--gpg-sign="));

    // Short flags may be combined: -sS, -sSm, ...
    for word in &invocation.rest {
        if word.starts_with('-') && !word.starts_with("--") {
            signoff |= word.contains('s');
            gpg_sign |= word.contains('S');
        }
    }

    signoff && gpg_sign
}
