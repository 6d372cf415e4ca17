//! Built-in validators and their registry wiring.

mod commit_msg;
mod file_markdown;
mod git_branch;
mod git_commit;
mod git_push;
mod secrets;
mod shell_script;

use std::sync::Arc;

use crate::config::KlackConfig;
use crate::event::EventKind;
use crate::event::ToolKind;
use crate::predicate::Predicate;
use crate::registry::Registry;

pub use commit_msg::ParsedTitle;
pub use commit_msg::parse_title;
pub use file_markdown::MarkdownValidator;
pub use git_branch::BranchValidator;
pub use git_commit::CommitValidator;
pub use git_push::PushValidator;
pub use secrets::SecretsValidator;
pub use shell_script::ShellScriptValidator;

/// Register the built-in validators, honoring per-validator `enabled`
/// flags from the configuration.
pub fn builtin_registry(config: &KlackConfig) -> Registry {
    let mut registry = Registry::new();

    let pre_bash = || {
        Predicate::all([
            Predicate::EventIs(EventKind::PreToolUse),
            Predicate::ToolIs(ToolKind::Bash),
        ])
    };
    let pre_file_write = || {
        Predicate::all([
            Predicate::EventIs(EventKind::PreToolUse),
            Predicate::ToolIn(vec![ToolKind::Write, ToolKind::Edit, ToolKind::MultiEdit]),
        ])
    };

    let mut register = |name: &str, predicate: Predicate, validator: Arc<dyn crate::Validator>| {
        if config.validator_enabled(name) {
            registry.register(predicate, validator);
        }
    };

    register(
        "validate-commit",
        Predicate::all([pre_bash(), Predicate::CommandContains("git commit".into())]),
        Arc::new(CommitValidator),
    );
    register(
        "validate-branch-name",
        Predicate::all([
            pre_bash(),
            Predicate::any([
                Predicate::CommandContains("git checkout".into()),
                Predicate::CommandContains("git switch".into()),
                Predicate::CommandContains("git branch".into()),
            ]),
        ]),
        Arc::new(BranchValidator),
    );
    register(
        "validate-push",
        Predicate::all([pre_bash(), Predicate::CommandContains("git push".into())]),
        Arc::new(PushValidator),
    );
    register(
        "validate-markdown",
        Predicate::all([pre_file_write(), Predicate::FileExtension("md".into())]),
        Arc::new(MarkdownValidator),
    );
    register(
        "validate-shell",
        Predicate::all([
            pre_file_write(),
            Predicate::any([
                Predicate::FileExtension("sh".into()),
                Predicate::FileExtension("bash".into()),
            ]),
        ]),
        Arc::new(ShellScriptValidator),
    );
    register(
        "validate-secrets",
        pre_file_write(),
        Arc::new(SecretsValidator),
    );

    registry
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ValidatorConfig;
    use crate::event::HookContext;
    use crate::event::ToolInput;

    fn hook(tool: ToolKind, input: ToolInput) -> HookContext {
        HookContext {
            event: EventKind::PreToolUse,
            tool,
            input,
            session_id: None,
            notification_type: None,
            cwd: PathBuf::from("/tmp"),
            raw: String::new(),
        }
    }

    fn selected_names(config: &KlackConfig, hook: &HookContext) -> Vec<String> {
        builtin_registry(config)
            .select(hook)
            .iter()
            .map(|v| v.name().to_string())
            .collect()
    }

    #[test]
    fn commit_command_selects_only_the_commit_validator() {
        let config = KlackConfig::default();
        let hook = hook(
            ToolKind::Bash,
            ToolInput {
                command: Some("git commit -sS -m \"feat: x\"".to_string()),
                ..ToolInput::default()
            },
        );
        assert_eq!(selected_names(&config, &hook), vec!["validate-commit"]);
    }

    #[test]
    fn markdown_write_selects_markdown_and_secrets() {
        let config = KlackConfig::default();
        let hook = hook(
            ToolKind::Write,
            ToolInput {
                file_path: Some("docs/guide.md".to_string()),
                content: Some("# hi\n".to_string()),
                ..ToolInput::default()
            },
        );
        assert_eq!(
            selected_names(&config, &hook),
            vec!["validate-markdown", "validate-secrets"]
        );
    }

    #[test]
    fn disabled_validator_is_not_registered() {
        let mut config = KlackConfig::default();
        config.validators.insert(
            "validate-secrets".to_string(),
            ValidatorConfig {
                enabled: false,
                timeout_secs: None,
            },
        );
        let hook = hook(
            ToolKind::Write,
            ToolInput {
                file_path: Some("a.md".to_string()),
                content: Some("x\n".to_string()),
                ..ToolInput::default()
            },
        );
        assert_eq!(selected_names(&config, &hook), vec!["validate-markdown"]);
    }

    #[test]
    fn read_tools_select_nothing() {
        let config = KlackConfig::default();
        let hook = hook(
            ToolKind::Read,
            ToolInput {
                file_path: Some("a.md".to_string()),
                ..ToolInput::default()
            },
        );
        assert!(selected_names(&config, &hook).is_empty());
    }
}
