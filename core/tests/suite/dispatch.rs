//! End-to-end dispatch scenarios.

use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;

use klack_core::ValidationResult;
use klack_core::dispatcher::Verdict;
use klack_core::registry::Registry;
use klack_core::result::reference_url;
use klack_core::rules::RuleAction;
use klack_core::rules::RuleConfig;

use super::Harness;
use super::StubValidator;
use super::bash_event;
use super::block_rule;
use super::commit_predicate;

#[tokio::test]
async fn simple_allow_runs_no_validator_and_prints_nothing() {
    let (stub, calls) = StubValidator::new("validate-commit", ValidationResult::pass());
    let mut registry = Registry::new();
    registry.register(commit_predicate(), stub);

    let harness = Harness::new(registry, Vec::new());
    let outcome = harness.dispatcher.dispatch(&bash_event("ls", None)).await;

    assert_eq!(outcome.verdict, Verdict::Allow);
    assert_eq!(outcome.verdict.exit_code(), 0);
    assert_eq!(outcome.rendered, "");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn validator_failure_blocks_renders_and_poisons() {
    let failure = ValidationResult::fail_with_code(
        "GIT010",
        "Add -sS flags to your commit command",
        Some("git commit -sS ...".to_string()),
        None,
    );
    let (stub, calls) = StubValidator::new("validate-commit", failure);
    let mut registry = Registry::new();
    registry.register(commit_predicate(), stub);

    let harness = Harness::new(registry, Vec::new());
    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("git commit -m \"x\"", Some("s1")))
        .await;

    assert_eq!(outcome.verdict, Verdict::Block);
    assert_eq!(outcome.verdict.exit_code(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(outcome.rendered.contains("Failed: validate-commit"));
    assert!(outcome.rendered.contains('✖'));
    assert!(outcome.rendered.contains("GIT010"));
    assert!(outcome.rendered.contains(&reference_url("GIT010")));

    // The session is now poisoned with the failing code.
    let entries = harness.audit_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].session_id, "s1");
    assert_eq!(entries[0].poison_codes, vec!["GIT010".to_string()]);
}

#[tokio::test]
async fn rule_block_short_circuits_before_validators() {
    let (stub, calls) = StubValidator::new("validate-commit", ValidationResult::pass());
    let mut registry = Registry::new();
    registry.register(commit_predicate(), stub);

    let harness = Harness::new(registry, vec![block_rule("no-root-rm", "^rm -rf /", "SEC999")]);
    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("rm -rf /", Some("s2")))
        .await;

    assert_eq!(outcome.verdict, Verdict::Block);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(outcome.rendered.contains("SEC999"));

    let entries = harness.audit_entries();
    assert_eq!(entries[0].session_id, "s2");
    assert_eq!(entries[0].poison_codes, vec!["SEC999".to_string()]);
}

#[tokio::test]
async fn warn_verdict_exits_zero_with_diagnostics() {
    let (stub, _) = StubValidator::new("validate-markdown", ValidationResult::warn("loose ends"));
    let mut registry = Registry::new();
    registry.register(commit_predicate(), stub);

    let harness = Harness::new(registry, Vec::new());
    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("git commit -m x", None))
        .await;

    assert_eq!(outcome.verdict, Verdict::Warn);
    assert_eq!(outcome.verdict.exit_code(), 0);
    assert!(!outcome.rendered.contains("Failed:"));
    assert!(outcome.rendered.contains("loose ends"));
}

#[tokio::test]
async fn allow_rule_suppresses_matching_validator_failure() {
    let (stub, _) = StubValidator::new(
        "validate-commit",
        ValidationResult::fail_with_code("GIT010", "nope", None, None),
    );
    let mut registry = Registry::new();
    registry.register(commit_predicate(), stub);

    let allow = RuleConfig {
        name: "allow-commit-here".to_string(),
        enabled: true,
        action: RuleAction::Allow,
        event: None,
        tool: None,
        repo: None,
        branch: None,
        file: None,
        content: None,
        command: Some("git commit".to_string()),
        validator: Some("validate-commit".to_string()),
        message: None,
        code: None,
        fix_hint: None,
        reference: None,
    };

    let harness = Harness::new(registry, vec![allow]);
    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("git commit -m x", Some("s3")))
        .await;

    assert_eq!(outcome.verdict, Verdict::Allow);
    assert_eq!(outcome.rendered, "");
    // A suppressed failure never poisons the session.
    assert!(harness.audit_entries().is_empty());
}

#[tokio::test]
async fn allow_rule_with_other_target_does_not_suppress() {
    let (stub, _) = StubValidator::new(
        "validate-commit",
        ValidationResult::fail_with_code("GIT010", "nope", None, None),
    );
    let mut registry = Registry::new();
    registry.register(commit_predicate(), stub);

    let allow = RuleConfig {
        name: "allow-other".to_string(),
        enabled: true,
        action: RuleAction::Allow,
        event: None,
        tool: None,
        repo: None,
        branch: None,
        file: None,
        content: None,
        command: Some("git commit".to_string()),
        validator: Some("validate-push".to_string()),
        message: None,
        code: None,
        fix_hint: None,
        reference: None,
    };

    let harness = Harness::new(registry, vec![allow]);
    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("git commit -m x", None))
        .await;

    assert_eq!(outcome.verdict, Verdict::Block);
}

#[tokio::test]
async fn empty_registration_allows_with_no_output() {
    let harness = Harness::new(Registry::new(), Vec::new());
    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("anything at all", None))
        .await;
    assert_eq!(outcome.verdict, Verdict::Allow);
    assert_eq!(outcome.rendered, "");
}

#[tokio::test]
async fn without_session_id_no_poison_is_recorded() {
    let (stub, _) = StubValidator::new(
        "validate-commit",
        ValidationResult::fail_with_code("GIT010", "nope", None, None),
    );
    let mut registry = Registry::new();
    registry.register(commit_predicate(), stub);

    let harness = Harness::new(registry, Vec::new());
    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("git commit -m x", None))
        .await;

    assert_eq!(outcome.verdict, Verdict::Block);
    assert!(harness.audit_entries().is_empty());
}

#[tokio::test]
async fn rule_warn_and_validator_results_aggregate_sorted() {
    let (passing, _) = StubValidator::new("a-passing", ValidationResult::pass());
    let (warning, _) = StubValidator::new("z-warning", ValidationResult::warn("careful"));
    let mut registry = Registry::new();
    registry.register(commit_predicate(), passing);
    registry.register(commit_predicate(), warning);

    let mut warn_rule = block_rule("m-rule", "git commit", "W001");
    warn_rule.action = RuleAction::Warn;

    let harness = Harness::new(registry, vec![warn_rule]);
    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("git commit -m x", None))
        .await;

    assert_eq!(outcome.verdict, Verdict::Warn);
    let names: Vec<&str> = outcome.results.iter().map(|r| r.validator.as_str()).collect();
    assert_eq!(names, vec!["a-passing", "m-rule", "z-warning"]);
}
