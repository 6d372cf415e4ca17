//! Category-scheduled parallel executor.
//!
//! Selected validators run concurrently, each gated by its category's
//! semaphore: CPU-bound work is bounded by the hardware thread count,
//! I/O-bound work may oversubscribe 2x, and `Git` validators are strictly
//! serial because concurrent repository commands contend on the index
//! lock. A per-validator deadline bounds every `validate` call; an
//! optional top-level deadline bounds the whole event. Panics inside a
//! validator never take down the process - they convert to a blocking
//! diagnostic result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
#[cfg(test)]
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::event::HookContext;
use crate::result::ValidationResult;
use crate::validator::Category;
use crate::validator::TimeoutPolicy;
use crate::validator::Validator;
use crate::validator::ValidatorContext;

/// Default per-validator deadline.
pub const DEFAULT_VALIDATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// How long cancelled in-flight validators get before being abandoned.
const CANCEL_GRACE: Duration = Duration::from_millis(100);

/// Engine-produced diagnostic codes.
const CODE_PANIC: &str = "SYS001";
const CODE_TIMEOUT: &str = "SYS002";

/// The three bounded permit pools, one per [`Category`].
#[derive(Clone)]
pub struct CategoryPools {
    cpu: Arc<Semaphore>,
    io: Arc<Semaphore>,
    git: Arc<Semaphore>,
}

impl CategoryPools {
    /// Pools sized from the host: CPU = hardware threads (at least 1),
    /// IO = 2x, Git = 1.
    pub fn from_host() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_permits(threads, threads * 2)
    }

    pub fn with_permits(cpu: usize, io: usize) -> Self {
        Self {
            cpu: Arc::new(Semaphore::new(cpu.max(1))),
            io: Arc::new(Semaphore::new(io.max(1))),
            git: Arc::new(Semaphore::new(1)),
        }
    }

    fn for_category(&self, category: Category) -> Arc<Semaphore> {
        match category {
            Category::Cpu => Arc::clone(&self.cpu),
            Category::Io => Arc::clone(&self.io),
            Category::Git => Arc::clone(&self.git),
        }
    }
}

/// Runs a selected validator set under the category pools and aggregates
/// the results, sorted by validator name regardless of completion order.
pub struct Executor {
    pools: CategoryPools,
    default_timeout: Duration,
    timeout_overrides: BTreeMap<String, Duration>,
    event_deadline: Option<Duration>,
}

impl Executor {
    pub fn new(pools: CategoryPools) -> Self {
        Self {
            pools,
            default_timeout: DEFAULT_VALIDATOR_TIMEOUT,
            timeout_overrides: BTreeMap::new(),
            event_deadline: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Per-validator timeout override, keyed by validator name.
    pub fn with_timeout_override(mut self, validator: impl Into<String>, timeout: Duration) -> Self {
        self.timeout_overrides.insert(validator.into(), timeout);
        self
    }

    /// Deadline for the whole event. Expiry cancels outstanding work;
    /// results already collected are still reported.
    pub fn with_event_deadline(mut self, deadline: Duration) -> Self {
        self.event_deadline = Some(deadline);
        self
    }

    fn timeout_for(&self, validator: &str) -> Duration {
        self.timeout_overrides
            .get(validator)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Run every validator in `selected` concurrently and return their
    /// results sorted by validator name.
    pub async fn run(
        &self,
        selected: Vec<Arc<dyn Validator>>,
        cx: &ValidatorContext,
        hook: &HookContext,
    ) -> Vec<ValidationResult> {
        if selected.is_empty() {
            return Vec::new();
        }

        let accumulator: Arc<Mutex<Vec<ValidationResult>>> =
            Arc::new(Mutex::new(Vec::with_capacity(selected.len())));
        let cancel = cx.cancel.clone();
        let mut tasks = JoinSet::new();

        for validator in selected {
            let semaphore = self.pools.for_category(validator.category());
            let timeout = self.timeout_for(validator.name());
            let accumulator = Arc::clone(&accumulator);
            let cancel = cancel.clone();
            let cx = cx.clone();
            let hook = hook.clone();

            tasks.spawn(async move {
                // Acquisition respects cancellation: a cancelled event
                // never invokes the validator.
                let permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                let name = validator.name().to_string();
                let policy = validator.timeout_policy();

                // The inner spawn isolates panics: a panicking validator
                // surfaces as a diagnostic result, not a dead process.
                let body = {
                    let validator = Arc::clone(&validator);
                    tokio::spawn(async move { validator.validate(&cx, &hook).await })
                };

                let outcome = tokio::time::timeout(timeout, body).await;
                drop(permit);

                let mut result = match outcome {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) if join_err.is_panic() => {
                        warn!(validator = %name, "validator panicked");
                        ValidationResult::fail_with_code(
                            CODE_PANIC,
                            format!("validator `{name}` panicked; treating the operation as blocked"),
                            None,
                            None,
                        )
                    }
                    Ok(Err(_)) => return,
                    Err(_) => timeout_result(&name, &policy, timeout),
                };
                result.validator = name;

                // Late results of a cancelled event are discarded.
                if cancel.is_cancelled() {
                    return;
                }
                accumulator.lock().await.push(result);
            });
        }

        let drain = async {
            while tasks.join_next().await.is_some() {}
        };

        match self.event_deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, drain).await.is_err() {
                    debug!("event deadline expired; cancelling outstanding validators");
                    cancel.cancel();
                    let grace = async {
                        while tasks.join_next().await.is_some() {}
                    };
                    let _ = tokio::time::timeout(CANCEL_GRACE, grace).await;
                    tasks.shutdown().await;
                }
            }
            None => drain.await,
        }

        let mut results = std::mem::take(&mut *accumulator.lock().await);
        results.sort_by(|a, b| a.validator.cmp(&b.validator));
        results
    }
}

fn timeout_result(name: &str, policy: &TimeoutPolicy, timeout: Duration) -> ValidationResult {
    match policy {
        TimeoutPolicy::Warn => ValidationResult::warn_with_code(
            CODE_TIMEOUT,
            format!("validator `{name}` timed out after {}s", timeout.as_secs()),
        ),
        TimeoutPolicy::Fail { code } => ValidationResult::fail_with_code(
            code.as_str(),
            format!(
                "validator `{name}` timed out after {}s and requires completion",
                timeout.as_secs()
            ),
            None,
            None,
        ),
    }
}
