//! Error taxonomy for the validation engine.
//!
//! Validator findings are never errors - they travel as
//! [`crate::result::ValidationResult`]s. The types here cover the engine's
//! own plumbing: payload parsing, configuration load, state persistence,
//! and capability failures. Plumbing errors surface with a distinct exit
//! status and are never converted into a fabricated `block`.

use std::path::PathBuf;

use thiserror::Error;

/// Event payload could not be turned into a hook context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input: no payload on stdin and CLAUDE_TOOL_INPUT is unset")]
    Empty,

    #[error("failed to read input: {0}")]
    Read(String),

    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("event type missing from payload and command line")]
    MissingEvent,

    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    #[error("tool event carries no tool input")]
    MissingToolInput,
}

/// Configuration was present but unusable. Detected at load; the
/// dispatcher refuses to run on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("config file {0} is world-writable; refusing to load it")]
    InsecurePermissions(PathBuf),

    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// A declarative rule failed to compile.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule `{rule}`: invalid {field} pattern `{pattern}`: {message}")]
    InvalidPattern {
        rule: String,
        field: &'static str,
        pattern: String,
        message: String,
    },
}

/// Session state could not be read or written. The session layer
/// downgrades these to "tracking disabled for this event".
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to access session state: {0}")]
    Io(#[from] std::io::Error),

    #[error("session state file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Audit log write failed. Non-fatal by contract.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to write audit log: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Subprocess capability failure, distinct from a tool's own findings.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("i/o error while running `{program}`: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },

    #[error("command cancelled")]
    Cancelled,
}
