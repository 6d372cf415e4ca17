//! Top-level event pipeline.
//!
//! One dispatch: session fast-fail (with unpoison handling) → rule
//! evaluation → validator selection → parallel execution → allow-rule
//! suppression → verdict → render → poison on block. The dispatcher is
//! stateless across events except for the session cache it consults.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::capabilities::Capabilities;
use crate::event::HookContext;
use crate::executor::Executor;
use crate::registry::Registry;
use crate::render::render;
use crate::result::ValidationResult;
use crate::rules::RuleEngine;
use crate::rules::RuleScope;
use crate::session::SessionCheck;
use crate::session::SessionManager;
use crate::validator::ValidatorContext;

/// Validator label used for the fast-fail result of a poisoned session.
const SESSION_VALIDATOR: &str = "session";

/// Final decision for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Warn,
    Block,
}

impl Verdict {
    /// Process exit status: non-blocking verdicts exit 0, `block` exits 2.
    /// (Parse and internal errors use a different nonzero status.)
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Allow | Self::Warn => 0,
            Self::Block => 2,
        }
    }
}

/// Everything the caller needs to report one dispatched event.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub verdict: Verdict,
    pub results: Vec<ValidationResult>,
    /// Diagnostic text for stderr; empty for `allow`.
    pub rendered: String,
}

impl DispatchOutcome {
    fn new(verdict: Verdict, mut results: Vec<ValidationResult>) -> Self {
        results.sort_by(|a, b| a.validator.cmp(&b.validator));
        let rendered = render(verdict, &results);
        Self {
            verdict,
            results,
            rendered,
        }
    }
}

pub struct Dispatcher {
    registry: Registry,
    rules: RuleEngine,
    executor: Executor,
    session: Arc<SessionManager>,
    caps: Capabilities,
}

impl Dispatcher {
    pub fn new(
        registry: Registry,
        rules: RuleEngine,
        executor: Executor,
        session: Arc<SessionManager>,
        caps: Capabilities,
    ) -> Self {
        Self {
            registry,
            rules,
            executor,
            session,
            caps,
        }
    }

    /// Run the full pipeline for one event.
    pub async fn dispatch(&self, hook: &HookContext) -> DispatchOutcome {
        // Session handling: apply any unpoison token first, then consult
        // the fast-fail cache.
        if let Some(session_id) = hook.session_id.as_deref() {
            if let Some(command) = hook.command() {
                if let Some(token) = self.session.try_unpoison(session_id, command, &hook.cwd) {
                    debug!(session_id, codes = ?token.codes, "applied unpoison token");
                }
            }

            if let SessionCheck::Poisoned { codes } = self.session.check(session_id) {
                return DispatchOutcome::new(Verdict::Block, vec![fast_fail_result(&codes)]);
            }
        }

        // Rules run before validators and may short-circuit everything.
        let scope = self.resolve_scope(hook).await;
        let rule_outcome = self.rules.evaluate(hook, &scope);
        if !rule_outcome.blocks.is_empty() {
            let results = rule_outcome.blocks;
            self.poison_from(hook, &results);
            return DispatchOutcome::new(Verdict::Block, results);
        }

        // Validator selection and parallel execution.
        let selected = self.registry.select(hook);
        debug!(count = selected.len(), "selected validators");
        let cancel = CancellationToken::new();
        let cx = ValidatorContext::new(self.caps.clone(), cancel);
        let mut results = self.executor.run(selected, &cx, hook).await;
        results.extend(rule_outcome.warns);

        // Allow rules neutralize matching failures.
        for result in &mut results {
            if !result.passed()
                && rule_outcome
                    .allows
                    .iter()
                    .any(|scope| scope.covers(&result.validator))
            {
                debug!(validator = %result.validator, "failure suppressed by allow rule");
                result.suppress();
            }
        }

        let verdict = compute_verdict(&results);
        if verdict == Verdict::Block {
            self.poison_from(hook, &results);
        }

        DispatchOutcome::new(verdict, results)
    }

    /// Repository facts for rule matching, resolved only when some rule
    /// needs them.
    async fn resolve_scope(&self, hook: &HookContext) -> RuleScope {
        if !self.rules.needs_git_scope() {
            return RuleScope::default();
        }
        let cancel = CancellationToken::new();
        RuleScope {
            repo: self.caps.git.remote_url(&cancel, &hook.cwd, "origin").await,
            branch: self.caps.git.current_branch(&cancel, &hook.cwd).await,
        }
    }

    fn poison_from(&self, hook: &HookContext, results: &[ValidationResult]) {
        let Some(session_id) = hook.session_id.as_deref() else {
            return;
        };
        let mut codes = Vec::new();
        let mut message = None;
        for result in results {
            if result.should_block() && !result.suppressed() {
                for code in result.codes() {
                    if !codes.contains(&code) {
                        codes.push(code);
                    }
                }
                if message.is_none() {
                    message = result.message().map(str::to_string);
                }
            }
        }
        if codes.is_empty() {
            // Blocking failures without codes still poison, under a
            // generic code, so the fast-fail path stays actionable.
            codes.push("BLOCKED".to_string());
        }
        self.session.poison(session_id, codes, message, hook);
    }
}

fn fast_fail_result(codes: &[String]) -> ValidationResult {
    let joined = codes.join(", ");
    ValidationResult::fail(format!(
        "Session is blocked by earlier failures: {joined}. Fix the underlying problem, then clear it by appending `# SESS:{}` to your next command.",
        codes.join(",")
    ))
    .with_detail("poison_codes", joined)
    .named(SESSION_VALIDATOR)
}

fn compute_verdict(results: &[ValidationResult]) -> Verdict {
    let active = results.iter().filter(|r| !r.suppressed());
    let mut verdict = Verdict::Allow;
    for result in active {
        if result.should_block() {
            return Verdict::Block;
        }
        if !result.passed() {
            verdict = Verdict::Warn;
        }
    }
    verdict
}
