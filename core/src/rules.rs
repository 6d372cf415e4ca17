//! Declarative rule engine.
//!
//! Rules are configuration entities evaluated before any validator runs.
//! A rule's match is the conjunction of its non-empty sub-patterns; a rule
//! with no sub-pattern at all can never fire and is dropped at load time
//! with a warning. Matched rules produce synthetic results:
//!
//! - `block` - a blocking result; the dispatcher short-circuits, no
//!   validator runs, and the session is poisoned.
//! - `warn`  - a warning result appended to the aggregate.
//! - `allow` - a suppression scope: failures from validators whose name
//!   matches the rule's `validator` filter (all validators when absent)
//!   are neutralized during aggregation.
//!
//! Precedence is `block > warn > allow`, then declaration order.
//!
//! Patterns compile once at load: globs for repo/branch/file, regexes for
//! content/command, and name patterns (exact, pipe-separated, or regex)
//! for tools and validator names.

use globset::Glob;
use globset::GlobMatcher;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::error::RuleError;
use crate::event::EventKind;
use crate::event::HookContext;
use crate::result::ValidationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Block,
    Warn,
}

/// Rule as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub action: RuleAction,

    /// Match fields; all optional, combined by conjunction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventKind>,
    /// Tool name pattern: exact, pipe-separated, or regex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Glob matched against the repository remote URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Glob matched against the current branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Glob matched against the file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Regex matched against written content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Regex matched against the shell command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Validator name pattern; scopes `allow` suppression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Name matcher compiled from a tool/validator pattern.
#[derive(Debug, Clone)]
enum NamePattern {
    Exact(String),
    OneOf(Vec<String>),
    Regex(Regex),
}

impl NamePattern {
    fn compile(rule: &str, field: &'static str, pattern: &str) -> Result<Self, RuleError> {
        let trimmed = pattern.trim();
        let simple = trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '|' || c == ' ');
        if simple {
            if trimmed.contains('|') {
                return Ok(Self::OneOf(
                    trimmed.split('|').map(|p| p.trim().to_string()).collect(),
                ));
            }
            return Ok(Self::Exact(trimmed.to_string()));
        }
        Regex::new(trimmed)
            .map(Self::Regex)
            .map_err(|err| RuleError::InvalidPattern {
                rule: rule.to_string(),
                field,
                pattern: pattern.to_string(),
                message: err.to_string(),
            })
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(name) => name == value,
            Self::OneOf(names) => names.iter().any(|n| n == value),
            Self::Regex(regex) => regex.is_match(value),
        }
    }
}

/// Repository facts some rules need; resolved lazily by the dispatcher,
/// only when an enabled rule carries a repo or branch pattern.
#[derive(Debug, Clone, Default)]
pub struct RuleScope {
    pub repo: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug)]
struct CompiledRule {
    name: String,
    action: RuleAction,
    event: Option<EventKind>,
    tool: Option<NamePattern>,
    repo: Option<GlobMatcher>,
    branch: Option<GlobMatcher>,
    file: Option<GlobMatcher>,
    content: Option<Regex>,
    command: Option<Regex>,
    validator: Option<NamePattern>,
    message: Option<String>,
    code: Option<String>,
    fix_hint: Option<String>,
    reference: Option<String>,
}

impl CompiledRule {
    fn matches(&self, hook: &HookContext, scope: &RuleScope) -> bool {
        if let Some(event) = self.event {
            if hook.event != event {
                return false;
            }
        }
        if let Some(tool) = &self.tool {
            if !tool.matches(hook.tool.as_str()) {
                return false;
            }
        }
        if let Some(repo) = &self.repo {
            match &scope.repo {
                Some(value) => {
                    if !repo.is_match(value.as_str()) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(branch) = &self.branch {
            match &scope.branch {
                Some(value) => {
                    if !branch.is_match(value.as_str()) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(file) = &self.file {
            match hook.input.file_path.as_deref() {
                Some(path) => {
                    if !file.is_match(path) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(content) = &self.content {
            match hook.input.written_content() {
                Some(text) => {
                    if !content.is_match(text) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(command) = &self.command {
            match hook.command() {
                Some(cmd) => {
                    if !command.is_match(cmd) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    fn synthetic_result(&self) -> ValidationResult {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| format!("matched rule `{}`", self.name));
        let result = match (self.action, &self.code) {
            (RuleAction::Block, Some(code)) => ValidationResult::fail_with_code(
                code.as_str(),
                message,
                self.fix_hint.clone(),
                self.reference.clone(),
            ),
            (RuleAction::Block, None) => {
                let mut result = ValidationResult::fail(message);
                if let Some(reference) = &self.reference {
                    result = result.with_reference(reference.clone());
                }
                result
            }
            (RuleAction::Warn, Some(code)) => ValidationResult::warn_with_code(code.as_str(), message),
            (RuleAction::Warn, None) => ValidationResult::warn(message),
            (RuleAction::Allow, _) => ValidationResult::pass(),
        };
        result.named(self.name.clone())
    }
}

/// Scope of one matched `allow` rule during aggregation.
pub struct AllowScope {
    rule: String,
    validator: Option<NamePattern>,
}

impl AllowScope {
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Whether this scope suppresses failures from the named validator.
    pub fn covers(&self, validator: &str) -> bool {
        match &self.validator {
            Some(pattern) => pattern.matches(validator),
            None => true,
        }
    }
}

/// Verdict-relevant output of rule evaluation.
pub struct RuleOutcome {
    pub blocks: Vec<ValidationResult>,
    pub warns: Vec<ValidationResult>,
    pub allows: Vec<AllowScope>,
}

impl RuleOutcome {
    pub fn empty() -> Self {
        Self {
            blocks: Vec::new(),
            warns: Vec::new(),
            allows: Vec::new(),
        }
    }
}

/// Rule set compiled once at configuration load.
#[derive(Debug)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
    needs_git_scope: bool,
}

impl RuleEngine {
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            needs_git_scope: false,
        }
    }

    /// Compile the enabled rules. Invalid patterns are load errors; a rule
    /// with no sub-pattern set is dropped with a warning (it could never
    /// fire).
    pub fn compile(configs: &[RuleConfig]) -> Result<Self, RuleError> {
        let mut rules = Vec::new();
        for config in configs.iter().filter(|c| c.enabled) {
            if is_empty_match(config) {
                warn!(rule = %config.name, "rule has no match pattern and can never fire; skipping");
                continue;
            }
            rules.push(compile_rule(config)?);
        }
        let needs_git_scope = rules.iter().any(|r| r.repo.is_some() || r.branch.is_some());
        Ok(Self {
            rules,
            needs_git_scope,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether evaluation needs repository facts resolved first.
    pub fn needs_git_scope(&self) -> bool {
        self.needs_git_scope
    }

    /// Evaluate all rules against the hook context, in declaration order.
    pub fn evaluate(&self, hook: &HookContext, scope: &RuleScope) -> RuleOutcome {
        let mut outcome = RuleOutcome::empty();
        for rule in &self.rules {
            if !rule.matches(hook, scope) {
                continue;
            }
            match rule.action {
                RuleAction::Block => outcome.blocks.push(rule.synthetic_result()),
                RuleAction::Warn => outcome.warns.push(rule.synthetic_result()),
                RuleAction::Allow => outcome.allows.push(AllowScope {
                    rule: rule.name.clone(),
                    validator: rule.validator.clone(),
                }),
            }
        }
        outcome
    }
}

fn is_empty_match(config: &RuleConfig) -> bool {
    config.event.is_none()
        && config.tool.is_none()
        && config.repo.is_none()
        && config.branch.is_none()
        && config.file.is_none()
        && config.content.is_none()
        && config.command.is_none()
        && config.validator.is_none()
}

fn compile_rule(config: &RuleConfig) -> Result<CompiledRule, RuleError> {
    let glob = |field: &'static str, pattern: &Option<String>| -> Result<Option<GlobMatcher>, RuleError> {
        pattern
            .as_deref()
            .map(|p| {
                Glob::new(p)
                    .map(|g| g.compile_matcher())
                    .map_err(|err| RuleError::InvalidPattern {
                        rule: config.name.clone(),
                        field,
                        pattern: p.to_string(),
                        message: err.to_string(),
                    })
            })
            .transpose()
    };
    let regex = |field: &'static str, pattern: &Option<String>| -> Result<Option<Regex>, RuleError> {
        pattern
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|err| RuleError::InvalidPattern {
                    rule: config.name.clone(),
                    field,
                    pattern: p.to_string(),
                    message: err.to_string(),
                })
            })
            .transpose()
    };

    Ok(CompiledRule {
        name: config.name.clone(),
        action: config.action,
        event: config.event,
        tool: config
            .tool
            .as_deref()
            .map(|p| NamePattern::compile(&config.name, "tool", p))
            .transpose()?,
        repo: glob("repo", &config.repo)?,
        branch: glob("branch", &config.branch)?,
        file: glob("file", &config.file)?,
        content: regex("content", &config.content)?,
        command: regex("command", &config.command)?,
        validator: config
            .validator
            .as_deref()
            .map(|p| NamePattern::compile(&config.name, "validator", p))
            .transpose()?,
        message: config.message.clone(),
        code: config.code.clone(),
        fix_hint: config.fix_hint.clone(),
        reference: config.reference.clone(),
    })
}
