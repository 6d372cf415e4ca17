//! The validator contract.
//!
//! A validator is a named unit that inspects one [`HookContext`] and
//! produces a [`ValidationResult`]. It declares a concurrency
//! [`Category`] and a [`TimeoutPolicy`]; the executor enforces both.
//! Validators reach the outside world only through the injected
//! [`Capabilities`] - they never spawn processes directly and never hold
//! locks across `validate`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::capabilities::Capabilities;
use crate::event::HookContext;
use crate::result::ValidationResult;

/// Concurrency class. The executor bounds each class with its own
/// semaphore; `Git` is strictly serial because concurrent repository
/// commands contend on the index lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Cpu,
    Io,
    Git,
}

/// What the executor reports when a validator misses its deadline.
///
/// `Warn` (the default) fails open: the timeout is surfaced but the
/// operation proceeds. Validators whose correctness depends on completion
/// declare `Fail` with a dedicated timeout code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutPolicy {
    Warn,
    Fail { code: String },
}

/// Per-run context handed to every validator: the capability set plus the
/// cancellation token for the current event.
#[derive(Clone)]
pub struct ValidatorContext {
    pub caps: Capabilities,
    pub cancel: CancellationToken,
}

impl ValidatorContext {
    pub fn new(caps: Capabilities, cancel: CancellationToken) -> Self {
        Self { caps, cancel }
    }
}

#[async_trait]
pub trait Validator: Send + Sync {
    /// Stable display name, used in rendered output and bookkeeping.
    fn name(&self) -> &str;

    fn category(&self) -> Category;

    fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::Warn
    }

    /// Inspect the hook context and produce a result. Must honor
    /// `cx.cancel` promptly and be safe to invoke concurrently across
    /// different hook contexts.
    async fn validate(&self, cx: &ValidatorContext, hook: &HookContext) -> ValidationResult;
}
