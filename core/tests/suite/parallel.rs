//! Category scheduling observed through the full dispatcher.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use klack_core::Category;
use klack_core::HookContext;
use klack_core::Predicate;
use klack_core::ValidationResult;
use klack_core::Validator;
use klack_core::ValidatorContext;
use klack_core::dispatcher::Verdict;
use klack_core::registry::Registry;

use super::Harness;
use super::bash_event;

const SLEEP: Duration = Duration::from_millis(50);

/// Sleeps then passes, recording per-category concurrency.
struct SleepingValidator {
    name: String,
    category: Category,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Validator for SleepingValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn validate(&self, _cx: &ValidatorContext, _hook: &HookContext) -> ValidationResult {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(SLEEP).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        ValidationResult::pass()
    }
}

#[tokio::test]
async fn cpu_overlaps_while_git_serializes() {
    let cpu_current = Arc::new(AtomicUsize::new(0));
    let cpu_peak = Arc::new(AtomicUsize::new(0));
    let git_current = Arc::new(AtomicUsize::new(0));
    let git_peak = Arc::new(AtomicUsize::new(0));

    let mut registry = Registry::new();
    for i in 0..3 {
        registry.register(
            Predicate::Always,
            Arc::new(SleepingValidator {
                name: format!("cpu-{i}"),
                category: Category::Cpu,
                current: Arc::clone(&cpu_current),
                peak: Arc::clone(&cpu_peak),
            }),
        );
    }
    for i in 0..2 {
        registry.register(
            Predicate::Always,
            Arc::new(SleepingValidator {
                name: format!("git-{i}"),
                category: Category::Git,
                current: Arc::clone(&git_current),
                peak: Arc::clone(&git_peak),
            }),
        );
    }

    let harness = Harness::new(registry, Vec::new());
    let started = Instant::now();
    let outcome = harness.dispatcher.dispatch(&bash_event("ls", None)).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.verdict, Verdict::Allow);
    assert_eq!(outcome.results.len(), 5);
    assert!(outcome.results.iter().all(|r| r.passed()));

    // Git never overlapped; CPU did (the harness pools allow 4).
    assert_eq!(git_peak.load(Ordering::SeqCst), 1);
    assert!(cpu_peak.load(Ordering::SeqCst) >= 2);

    // Wall clock is bounded by the serialized git pair plus slack, far
    // below the 5x sum a sequential run would take.
    assert!(
        elapsed < SLEEP * 4,
        "expected parallel execution, took {elapsed:?}"
    );

    // Reported order is alphabetical regardless of completion order.
    let names: Vec<&str> = outcome.results.iter().map(|r| r.validator.as_str()).collect();
    assert_eq!(names, vec!["cpu-0", "cpu-1", "cpu-2", "git-0", "git-1"]);
}
