//! Branch naming validation for branch-creating git commands.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::event::HookContext;
use crate::result::ValidationResult;
use crate::shell::GitInvocation;
use crate::shell::git_invocations;
use crate::validator::Category;
use crate::validator::Validator;
use crate::validator::ValidatorContext;

/// Branch types matching the conventional-commit vocabulary.
const VALID_TYPES: &[&str] = &[
    "build", "chore", "ci", "docs", "feat", "fix", "perf", "refactor", "style", "test",
];

/// Branches exempt from naming rules.
const PROTECTED: &[&str] = &["main", "master"];

/// `type/description` in lowercase kebab form.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+/[a-z0-9][a-z0-9-]*$").expect("branch name regex"));

const CHECKOUT_CREATE_FLAGS: &[&str] = &["-b", "-B", "--branch"];
const SWITCH_CREATE_FLAGS: &[&str] = &["-c", "--create", "-C", "--force-create"];
const BRANCH_DELETE_FLAGS: &[&str] = &["-d", "-D", "--delete"];

/// Enforces `type/description` branch names on `git checkout -b`,
/// `git switch -c`, and `git branch <name>`.
#[derive(Debug, Default)]
pub struct BranchValidator;

#[async_trait]
impl Validator for BranchValidator {
    fn name(&self) -> &str {
        "validate-branch-name"
    }

    fn category(&self) -> Category {
        Category::Cpu
    }

    async fn validate(&self, _cx: &ValidatorContext, hook: &HookContext) -> ValidationResult {
        let Some(command) = hook.command() else {
            return ValidationResult::pass();
        };

        for invocation in git_invocations(command) {
            let branch = match invocation.subcommand.as_str() {
                "checkout" => created_branch(&invocation, CHECKOUT_CREATE_FLAGS),
                "switch" => created_branch(&invocation, SWITCH_CREATE_FLAGS),
                "branch" => branch_command_target(&invocation),
                _ => None,
            };
            if let Some(branch) = branch {
                let result = check_name(&branch);
                if !result.passed() {
                    return result;
                }
            }
        }

        ValidationResult::pass()
    }
}

/// Branch name for create-style invocations: the flag value, else the
/// first positional.
fn created_branch(invocation: &GitInvocation, create_flags: &[&str]) -> Option<String> {
    if !create_flags.iter().any(|flag| invocation.has_flag(flag)) {
        return None;
    }
    for flag in create_flags {
        if let Some(value) = invocation.flag_value(flag) {
            return Some(value.to_string());
        }
    }
    invocation
        .positionals(create_flags)
        .first()
        .map(|s| s.to_string())
}

/// `git branch <name>` creates; deletion flags skip validation.
fn branch_command_target(invocation: &GitInvocation) -> Option<String> {
    if BRANCH_DELETE_FLAGS.iter().any(|flag| invocation.has_flag(flag)) {
        return None;
    }
    invocation.positionals(&[]).first().map(|s| s.to_string())
}

fn check_name(branch: &str) -> ValidationResult {
    if PROTECTED.contains(&branch) {
        return ValidationResult::pass();
    }

    if branch.contains(' ') {
        return ValidationResult::fail_with_code(
            "GIT020",
            format!("Branch name `{branch}` contains spaces"),
            Some(format!("git checkout -b {}", branch.replace(' ', "-"))),
            None,
        );
    }

    if branch != branch.to_lowercase() {
        return ValidationResult::fail_with_code(
            "GIT021",
            format!("Branch name `{branch}` contains uppercase characters"),
            Some(format!("git checkout -b {}", branch.to_lowercase())),
            None,
        );
    }

    if !NAME_PATTERN.is_match(branch) {
        return ValidationResult::fail_with_code(
            "GIT022",
            format!("Branch name `{branch}` must look like type/short-description"),
            Some("git checkout -b feat/short-description".to_string()),
            None,
        );
    }

    let kind = branch.split('/').next().unwrap_or_default();
    if !VALID_TYPES.contains(&kind) {
        return ValidationResult::fail_with_code(
            "GIT023",
            format!(
                "Unknown branch type `{kind}`; use one of: {}",
                VALID_TYPES.join(", ")
            ),
            None,
            None,
        );
    }

    ValidationResult::pass()
}
