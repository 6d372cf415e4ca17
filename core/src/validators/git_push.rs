//! Push validation: the named remote must actually exist.
//!
//! A push to a misspelled or unconfigured remote fails only after git has
//! done its work; this validator catches it up front. The remote is the
//! first positional argument when one is given; a bare `git push` resolves
//! the current branch's configured remote, falling back to `origin`.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::event::HookContext;
use crate::result::ValidationResult;
use crate::shell::GitInvocation;
use crate::shell::git_invocations;
use crate::validator::Category;
use crate::validator::TimeoutPolicy;
use crate::validator::Validator;
use crate::validator::ValidatorContext;

const DEFAULT_REMOTE: &str = "origin";

/// Checks that the remote a `git push` targets is configured in the
/// repository. Runs in the `Git` category because it queries remote and
/// branch state.
#[derive(Debug, Default)]
pub struct PushValidator;

#[async_trait]
impl Validator for PushValidator {
    fn name(&self) -> &str {
        "validate-push"
    }

    fn category(&self) -> Category {
        Category::Git
    }

    // A push we could not fully inspect must not slip through.
    fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::Fail {
            code: "GIT039".to_string(),
        }
    }

    async fn validate(&self, cx: &ValidatorContext, hook: &HookContext) -> ValidationResult {
        let Some(command) = hook.command() else {
            return ValidationResult::pass();
        };

        for invocation in git_invocations(command) {
            if invocation.subcommand != "push" {
                continue;
            }
            let result = self.check_push(cx, hook, &invocation).await;
            if !result.passed() {
                return result;
            }
        }

        ValidationResult::pass()
    }
}

impl PushValidator {
    async fn check_push(
        &self,
        cx: &ValidatorContext,
        hook: &HookContext,
        invocation: &GitInvocation,
    ) -> ValidationResult {
        // `git -C <dir> push` is validated against that directory.
        let cwd = invocation
            .cwd_override
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| hook.cwd.clone());

        if !cx.caps.git.is_in_repo(&cx.cancel, &cwd).await {
            debug!("not in a git repository; skipping push validation");
            return ValidationResult::pass();
        }

        let Some(remote) = self.target_remote(cx, &cwd, invocation).await else {
            debug!("no remote named on the command line; skipping push validation");
            return ValidationResult::pass();
        };

        let remotes = cx.caps.git.remotes(&cx.cancel, &cwd).await;
        if remotes.iter().any(|candidate| candidate == &remote) {
            return ValidationResult::pass();
        }

        let fix = if remotes.is_empty() {
            format!("git remote add {remote} <url>")
        } else {
            format!("Available remotes: {}", remotes.join(", "))
        };
        ValidationResult::fail_with_code(
            "GIT030",
            format!("Remote `{remote}` does not exist in this repository"),
            Some(fix),
            None,
        )
        .with_detail("remote", remote)
    }

    /// The remote this push targets. With no arguments at all, git pushes
    /// to the current branch's configured remote, so that is what gets
    /// validated (falling back to `origin` when unset). Flag-only
    /// invocations name no remote and are skipped.
    async fn target_remote(
        &self,
        cx: &ValidatorContext,
        cwd: &std::path::Path,
        invocation: &GitInvocation,
    ) -> Option<String> {
        if invocation.rest.is_empty() {
            let Some(branch) = cx.caps.git.current_branch(&cx.cancel, cwd).await else {
                return Some(DEFAULT_REMOTE.to_string());
            };
            return Some(
                cx.caps
                    .git
                    .branch_remote(&cx.cancel, cwd, &branch)
                    .await
                    .unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
            );
        }

        invocation
            .positionals(&[])
            .first()
            .map(|remote| remote.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::capabilities::Capabilities;
    use crate::capabilities::GitQuery;
    use crate::event::EventKind;
    use crate::event::ToolInput;
    use crate::event::ToolKind;

    /// Repository facts served from memory; records the cwd of each query.
    struct FakeGit {
        in_repo: bool,
        branch: Option<String>,
        branch_remote: Option<String>,
        remotes: Vec<String>,
        seen_cwd: Mutex<Vec<PathBuf>>,
    }

    impl FakeGit {
        fn with_remotes(remotes: &[&str]) -> Self {
            Self {
                in_repo: true,
                branch: Some("feat/x".to_string()),
                branch_remote: None,
                remotes: remotes.iter().map(|r| r.to_string()).collect(),
                seen_cwd: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GitQuery for FakeGit {
        async fn is_in_repo(&self, _cancel: &CancellationToken, cwd: &Path) -> bool {
            self.seen_cwd.lock().unwrap().push(cwd.to_path_buf());
            self.in_repo
        }

        async fn repo_root(&self, _cancel: &CancellationToken, _cwd: &Path) -> Option<PathBuf> {
            None
        }

        async fn current_branch(&self, _cancel: &CancellationToken, _cwd: &Path) -> Option<String> {
            self.branch.clone()
        }

        async fn remote_url(
            &self,
            _cancel: &CancellationToken,
            _cwd: &Path,
            _remote: &str,
        ) -> Option<String> {
            None
        }

        async fn remotes(&self, _cancel: &CancellationToken, _cwd: &Path) -> Vec<String> {
            self.remotes.clone()
        }

        async fn branch_remote(
            &self,
            _cancel: &CancellationToken,
            _cwd: &Path,
            _branch: &str,
        ) -> Option<String> {
            self.branch_remote.clone()
        }

        async fn staged_files(&self, _cancel: &CancellationToken, _cwd: &Path) -> Vec<PathBuf> {
            Vec::new()
        }

        async fn modified_files(&self, _cancel: &CancellationToken, _cwd: &Path) -> Vec<PathBuf> {
            Vec::new()
        }

        async fn untracked_files(&self, _cancel: &CancellationToken, _cwd: &Path) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    fn bash(command: &str) -> HookContext {
        HookContext {
            event: EventKind::PreToolUse,
            tool: ToolKind::Bash,
            input: ToolInput {
                command: Some(command.to_string()),
                ..ToolInput::default()
            },
            session_id: None,
            notification_type: None,
            cwd: PathBuf::from("/project"),
            raw: String::new(),
        }
    }

    async fn run_with(git: FakeGit, command: &str) -> ValidationResult {
        let mut caps = Capabilities::system();
        caps.git = Arc::new(git);
        let cx = ValidatorContext::new(caps, CancellationToken::new());
        PushValidator.validate(&cx, &bash(command)).await
    }

    #[tokio::test]
    async fn outside_a_repository_passes() {
        let mut git = FakeGit::with_remotes(&[]);
        git.in_repo = false;
        assert!(run_with(git, "git push nowhere main").await.passed());
    }

    #[tokio::test]
    async fn known_remote_passes() {
        let git = FakeGit::with_remotes(&["origin", "upstream"]);
        assert!(run_with(git, "git push upstream feat/x").await.passed());
    }

    #[tokio::test]
    async fn unknown_remote_is_git030_with_available_remotes() {
        let git = FakeGit::with_remotes(&["origin"]);
        let result = run_with(git, "git push orign feat/x").await;
        assert!(result.should_block());
        assert_eq!(result.codes(), vec!["GIT030".to_string()]);
        assert_eq!(
            result.findings[0].fix.as_deref(),
            Some("Available remotes: origin")
        );
        assert_eq!(result.details.get("remote").map(String::as_str), Some("orign"));
    }

    #[tokio::test]
    async fn no_remotes_at_all_suggests_adding_one() {
        let git = FakeGit::with_remotes(&[]);
        let result = run_with(git, "git push origin main").await;
        assert_eq!(result.codes(), vec!["GIT030".to_string()]);
        assert_eq!(
            result.findings[0].fix.as_deref(),
            Some("git remote add origin <url>")
        );
    }

    #[tokio::test]
    async fn bare_push_resolves_the_branch_remote() {
        let mut git = FakeGit::with_remotes(&["upstream"]);
        git.branch_remote = Some("upstream".to_string());
        assert!(run_with(git, "git push").await.passed());

        let mut missing = FakeGit::with_remotes(&["origin"]);
        missing.branch_remote = Some("upstream".to_string());
        let result = run_with(missing, "git push").await;
        assert_eq!(result.codes(), vec!["GIT030".to_string()]);
    }

    #[tokio::test]
    async fn bare_push_without_branch_remote_falls_back_to_origin() {
        let git = FakeGit::with_remotes(&["origin"]);
        assert!(run_with(git, "git push").await.passed());

        let mut detached = FakeGit::with_remotes(&["origin"]);
        detached.branch = None;
        assert!(run_with(detached, "git push").await.passed());
    }

    #[tokio::test]
    async fn flag_only_push_names_no_remote_and_passes() {
        let git = FakeGit::with_remotes(&[]);
        assert!(run_with(git, "git push --force-with-lease").await.passed());
    }

    #[tokio::test]
    async fn dash_c_override_directs_queries_at_that_directory() {
        let git = FakeGit::with_remotes(&["origin"]);
        let seen = {
            let mut caps = Capabilities::system();
            let git = Arc::new(git);
            caps.git = Arc::clone(&git) as Arc<dyn GitQuery>;
            let cx = ValidatorContext::new(caps, CancellationToken::new());
            let result = PushValidator
                .validate(&cx, &bash("git -C /elsewhere push origin main"))
                .await;
            assert!(result.passed());
            git.seen_cwd.lock().unwrap().clone()
        };
        assert_eq!(seen, vec![PathBuf::from("/elsewhere")]);
    }

    #[test]
    fn timeout_policy_requires_completion() {
        assert_eq!(
            PushValidator.timeout_policy(),
            TimeoutPolicy::Fail {
                code: "GIT039".to_string()
            }
        );
    }
}
