//! Predicate algebra for validator selection.
//!
//! Predicates are pure, cheap boolean functions over a [`HookContext`],
//! composable with [`Predicate::all`], [`Predicate::any`] and
//! [`Predicate::negate`]. Evaluation short-circuits. Anything that could
//! fail or touch the outside world belongs in a validator, not here.

use regex::Regex;

use crate::event::EventKind;
use crate::event::HookContext;
use crate::event::ToolKind;

#[derive(Debug, Clone)]
pub enum Predicate {
    /// Matches every event.
    Always,
    EventIs(EventKind),
    ToolIs(ToolKind),
    ToolIn(Vec<ToolKind>),
    /// File extension equality, without the dot, case-insensitive.
    FileExtension(String),
    FilePathContains(String),
    CommandContains(String),
    CommandMatches(Regex),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::All(predicates.into_iter().collect())
    }

    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::Any(predicates.into_iter().collect())
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Compile a command regex predicate, failing fast on a bad pattern.
    pub fn command_matches(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::CommandMatches(Regex::new(pattern)?))
    }

    pub fn matches(&self, hook: &HookContext) -> bool {
        match self {
            Self::Always => true,
            Self::EventIs(kind) => hook.event == *kind,
            Self::ToolIs(tool) => hook.tool == *tool,
            Self::ToolIn(tools) => tools.contains(&hook.tool),
            Self::FileExtension(ext) => hook
                .input
                .file_extension()
                .is_some_and(|actual| actual == ext.to_ascii_lowercase()),
            Self::FilePathContains(fragment) => hook
                .input
                .file_path
                .as_deref()
                .is_some_and(|path| path.contains(fragment)),
            Self::CommandContains(fragment) => {
                hook.command().is_some_and(|cmd| cmd.contains(fragment))
            }
            Self::CommandMatches(regex) => hook.command().is_some_and(|cmd| regex.is_match(cmd)),
            Self::All(predicates) => predicates.iter().all(|p| p.matches(hook)),
            Self::Any(predicates) => predicates.iter().any(|p| p.matches(hook)),
            Self::Not(predicate) => !predicate.matches(hook),
        }
    }
}
