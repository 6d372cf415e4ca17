//! Structured validation outcomes.
//!
//! Every validator (and every fired rule) produces a [`ValidationResult`]:
//! pass, warn, or fail, carrying zero or more [`Finding`]s with error
//! codes, fix hints and reference links. The constructors enforce the
//! central invariant `passed ⇒ !should_block`.

use std::collections::BTreeMap;

/// Severity of a single finding, with its rendering glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Error => "✖",
            Self::Warning => "⚠",
            Self::Info => "ℹ",
        }
    }
}

/// One diagnostic produced by a validator: an optional line number, a
/// severity, an optional stable code, the actionable message, and an
/// optional suggested replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub line: Option<u32>,
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    pub fix: Option<String>,
}

impl Finding {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            line: None,
            severity,
            code: None,
            message: message.into(),
            fix: None,
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

/// Canonical documentation link for a stable error code.
pub fn reference_url(code: &str) -> String {
    format!("https://github.com/klack-sh/klack/blob/main/docs/errors/{code}.md")
}

/// Outcome of one validator run (or one fired rule).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Display name of the producer; stamped by the executor for
    /// validators, set to the rule name for rule results.
    pub validator: String,
    passed: bool,
    should_block: bool,
    suppressed: bool,
    pub findings: Vec<Finding>,
    pub references: Vec<String>,
    pub details: BTreeMap<String, String>,
}

impl ValidationResult {
    fn new(passed: bool, should_block: bool) -> Self {
        debug_assert!(!(passed && should_block));
        Self {
            validator: String::new(),
            passed,
            should_block,
            suppressed: false,
            findings: Vec::new(),
            references: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    /// The operation is allowed.
    pub fn pass() -> Self {
        Self::new(true, false)
    }

    /// The operation is allowed, but the message is surfaced to the user.
    pub fn warn(message: impl Into<String>) -> Self {
        let mut result = Self::new(false, false);
        result.findings.push(Finding::warning(message));
        result
    }

    /// The operation is blocked.
    pub fn fail(message: impl Into<String>) -> Self {
        let mut result = Self::new(false, true);
        result.findings.push(Finding::error(message));
        result
    }

    /// The operation is blocked, with a stable code, a fix hint and a
    /// reference link. Preferred over [`ValidationResult::fail`]: the
    /// rendered output gives the user an immediately actionable next step.
    pub fn fail_with_code(
        code: impl Into<String>,
        message: impl Into<String>,
        fix: Option<String>,
        reference: Option<String>,
    ) -> Self {
        let code = code.into();
        let mut result = Self::new(false, true);
        let mut finding = Finding::error(message).with_code(code.clone());
        if let Some(fix) = fix {
            finding = finding.with_fix(fix);
        }
        result.references.push(reference.unwrap_or_else(|| reference_url(&code)));
        result.findings.push(finding);
        result
    }

    /// Non-blocking variant of [`ValidationResult::fail_with_code`].
    pub fn warn_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::new(false, false);
        result
            .findings
            .push(Finding::warning(message).with_code(code));
        result
    }

    /// Build a result from pre-collected findings: blocking if any finding
    /// is an error, a warning result otherwise, a pass when empty.
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        if findings.is_empty() {
            return Self::pass();
        }
        let blocking = findings.iter().any(|f| f.severity == Severity::Error);
        let mut result = Self::new(false, blocking);
        result.findings = findings;
        result
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(reference.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn named(mut self, validator: impl Into<String>) -> Self {
        self.validator = validator.into();
        self
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn should_block(&self) -> bool {
        self.should_block
    }

    /// Whether an `allow` rule has neutralized this result. Suppressed
    /// results keep their findings for logging but no longer affect the
    /// verdict or the rendered output.
    pub fn suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn suppress(&mut self) {
        self.suppressed = true;
    }

    /// Stable codes attached to this result's findings, for session
    /// poisoning and audit entries.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for finding in &self.findings {
            if let Some(code) = &finding.code {
                if !codes.contains(code) {
                    codes.push(code.clone());
                }
            }
        }
        codes
    }

    /// First finding message, used for audit summaries.
    pub fn message(&self) -> Option<&str> {
        self.findings.first().map(|f| f.message.as_str())
    }
}
