//! Validator registry: ordered (predicate, validator) pairs.

use std::sync::Arc;

use crate::event::HookContext;
use crate::predicate::Predicate;
use crate::validator::Validator;

struct Registration {
    predicate: Predicate,
    validator: Arc<dyn Validator>,
}

/// Holds the registered validators for the lifetime of the dispatcher.
///
/// Selection walks the registrations in order and keeps those whose
/// predicate matches; it is deterministic and O(N). Validators are
/// identified by registration, not by name - duplicate display names are
/// permitted.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, predicate: Predicate, validator: Arc<dyn Validator>) {
        self.entries.push(Registration { predicate, validator });
    }

    /// The subset of registered validators whose predicates match `hook`,
    /// in registration order.
    pub fn select(&self, hook: &HookContext) -> Vec<Arc<dyn Validator>> {
        self.entries
            .iter()
            .filter(|entry| entry.predicate.matches(hook))
            .map(|entry| Arc::clone(&entry.validator))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
