//! Shared fixtures for the integration suite.

mod dispatch;
mod parallel;
mod session_flow;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tempfile::TempDir;

use klack_core::Category;
use klack_core::EventKind;
use klack_core::HookContext;
use klack_core::Predicate;
use klack_core::ToolInput;
use klack_core::ToolKind;
use klack_core::ValidationResult;
use klack_core::Validator;
use klack_core::ValidatorContext;
use klack_core::capabilities::Capabilities;
use klack_core::dispatcher::Dispatcher;
use klack_core::executor::CategoryPools;
use klack_core::executor::Executor;
use klack_core::registry::Registry;
use klack_core::rules::RuleAction;
use klack_core::rules::RuleConfig;
use klack_core::rules::RuleEngine;
use klack_core::session::AuditEntry;
use klack_core::session::AuditLogger;
use klack_core::session::FileStateStore;
use klack_core::session::SessionManager;

/// Validator stub with a canned result and an invocation counter.
pub struct StubValidator {
    pub name: String,
    pub category: Category,
    pub result: ValidationResult,
    pub calls: Arc<AtomicUsize>,
}

impl StubValidator {
    pub fn new(name: &str, result: ValidationResult) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let stub = Arc::new(Self {
            name: name.to_string(),
            category: Category::Cpu,
            result,
            calls: Arc::clone(&calls),
        });
        (stub, calls)
    }
}

#[async_trait]
impl Validator for StubValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn validate(&self, _cx: &ValidatorContext, _hook: &HookContext) -> ValidationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Dispatcher wired against a temp directory for session state and audit.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(registry: Registry, rules: Vec<RuleConfig>) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let session = SessionManager::new(
            Arc::new(FileStateStore::new(dir.path().join("session_state.json"))),
            Arc::new(audit_logger(dir.path().to_path_buf())),
        );
        let dispatcher = Dispatcher::new(
            registry,
            RuleEngine::compile(&rules).expect("rules compile"),
            Executor::new(CategoryPools::with_permits(4, 8)),
            Arc::new(session),
            Capabilities::system(),
        );
        Self { dispatcher, dir }
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        audit_logger(self.dir.path().to_path_buf())
            .read()
            .expect("read audit log")
    }
}

fn audit_logger(dir: PathBuf) -> AuditLogger {
    AuditLogger::new(dir.join("session_audit.jsonl"), true, 10, 30, 5)
}

pub fn bash_event(command: &str, session_id: Option<&str>) -> HookContext {
    HookContext {
        event: EventKind::PreToolUse,
        tool: ToolKind::Bash,
        input: ToolInput {
            command: Some(command.to_string()),
            ..ToolInput::default()
        },
        session_id: session_id.map(str::to_string),
        notification_type: None,
        cwd: PathBuf::from("/tmp"),
        raw: String::new(),
    }
}

pub fn commit_predicate() -> Predicate {
    Predicate::all([
        Predicate::ToolIs(ToolKind::Bash),
        Predicate::CommandContains("git commit".to_string()),
    ])
}

pub fn block_rule(name: &str, command_pattern: &str, code: &str) -> RuleConfig {
    RuleConfig {
        name: name.to_string(),
        enabled: true,
        action: RuleAction::Block,
        event: None,
        tool: None,
        repo: None,
        branch: None,
        file: None,
        content: None,
        command: Some(command_pattern.to_string()),
        validator: None,
        message: None,
        code: Some(code.to_string()),
        fix_hint: None,
        reference: None,
    }
}
