//! Session poison lifecycle across consecutive events.

use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;

use klack_core::ValidationResult;
use klack_core::dispatcher::Verdict;
use klack_core::registry::Registry;
use klack_core::session::AuditAction;
use klack_core::session::UnpoisonSource;

use super::Harness;
use super::StubValidator;
use super::bash_event;
use super::commit_predicate;

fn failing_commit_harness() -> (Harness, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
    let failure = ValidationResult::fail_with_code(
        "GIT010",
        "Add -sS flags to your commit command",
        Some("git commit -sS ...".to_string()),
        None,
    );
    let (stub, calls) = StubValidator::new("validate-commit", failure);
    let mut registry = Registry::new();
    registry.register(commit_predicate(), stub);
    (Harness::new(registry, Vec::new()), calls)
}

#[tokio::test]
async fn poisoned_session_fast_fails_without_running_validators() {
    let (harness, calls) = failing_commit_harness();

    // First event blocks and poisons.
    let first = harness
        .dispatcher
        .dispatch(&bash_event("git commit -m \"x\"", Some("s1")))
        .await;
    assert_eq!(first.verdict, Verdict::Block);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Second event in the same session fast-fails; the validator does not
    // run even though its predicate would not match anyway - nothing runs.
    let second = harness
        .dispatcher
        .dispatch(&bash_event("git status", Some("s1")))
        .await;
    assert_eq!(second.verdict, Verdict::Block);
    assert_eq!(second.verdict.exit_code(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(second.rendered.contains("GIT010"));
    assert!(second.rendered.contains("SESS:GIT010"));
}

#[tokio::test]
async fn other_sessions_are_unaffected_by_poison() {
    let (harness, _) = failing_commit_harness();
    harness
        .dispatcher
        .dispatch(&bash_event("git commit -m \"x\"", Some("s1")))
        .await;

    let other = harness
        .dispatcher
        .dispatch(&bash_event("git status", Some("other")))
        .await;
    assert_eq!(other.verdict, Verdict::Allow);
}

#[tokio::test]
async fn unpoison_via_comment_restores_the_pipeline() {
    let (harness, calls) = failing_commit_harness();
    harness
        .dispatcher
        .dispatch(&bash_event("git commit -m \"x\"", Some("s1")))
        .await;

    // The unpoison event itself proceeds through the normal pipeline.
    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("git status # SESS:GIT010", Some("s1")))
        .await;
    assert_eq!(outcome.verdict, Verdict::Allow);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let entries = harness.audit_entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].action, AuditAction::Unpoison);
    assert_eq!(entries[1].source, Some(UnpoisonSource::Comment));
    assert_eq!(entries[1].poison_codes, vec!["GIT010".to_string()]);

    // And the session stays clean afterwards.
    let after = harness
        .dispatcher
        .dispatch(&bash_event("git status", Some("s1")))
        .await;
    assert_eq!(after.verdict, Verdict::Allow);
}

#[tokio::test]
async fn unpoison_via_env_prefix_is_audited_as_env_var() {
    let (harness, _) = failing_commit_harness();
    harness
        .dispatcher
        .dispatch(&bash_event("git commit -m \"x\"", Some("s1")))
        .await;

    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("KLACK=\"SESS:GIT010\" git status", Some("s1")))
        .await;
    assert_eq!(outcome.verdict, Verdict::Allow);

    let entries = harness.audit_entries();
    assert_eq!(entries[1].source, Some(UnpoisonSource::EnvVar));
}

#[tokio::test]
async fn unpoison_for_the_wrong_code_keeps_the_session_blocked() {
    let (harness, _) = failing_commit_harness();
    harness
        .dispatcher
        .dispatch(&bash_event("git commit -m \"x\"", Some("s1")))
        .await;

    let outcome = harness
        .dispatcher
        .dispatch(&bash_event("git status # SESS:SEC999", Some("s1")))
        .await;
    assert_eq!(outcome.verdict, Verdict::Block);
    assert!(outcome.rendered.contains("GIT010"));
}

#[tokio::test]
async fn repeated_blocks_merge_codes_into_one_record() {
    let (harness, _) = failing_commit_harness();
    harness
        .dispatcher
        .dispatch(&bash_event("git commit -m \"x\"", Some("s1")))
        .await;
    // Second event fast-fails; no new audit entry is written for it.
    harness
        .dispatcher
        .dispatch(&bash_event("git commit -m \"y\"", Some("s1")))
        .await;

    let entries = harness.audit_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Poison);
}
