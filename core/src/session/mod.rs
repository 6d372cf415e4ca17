//! Session poison: a per-session fast-fail cache.
//!
//! The first blocking failure in a session poisons it; every later event
//! in the same session is blocked immediately - no rules, no validators -
//! until the user acknowledges the failure with an unpoison token:
//!
//! - environment prefix: `KLACK="SESS:GIT010,GIT020" git status`
//! - trailing comment:   `git status # SESS:GIT010,GIT020`
//!
//! The listed codes are removed from the poison record; once none remain
//! the session is clean again. Both transitions write audit entries.

mod audit;
mod store;

use std::path::Path;
use std::sync::Arc;
use std::sync::LazyLock;

use chrono::Duration;
use chrono::Utc;
use regex::Regex;
use tracing::debug;
use tracing::warn;

use crate::event::HookContext;

pub use audit::AuditAction;
pub use audit::AuditEntry;
pub use audit::AuditLogger;
pub use audit::AuditSink;
pub use audit::AuditStats;
pub use audit::NullAuditSink;
pub use audit::UnpoisonSource;
pub use store::FileStateStore;
pub use store::SessionState;
pub use store::StateStore;

/// Default maximum session age before a poison record expires.
pub const DEFAULT_MAX_SESSION_AGE_HOURS: i64 = 24;

static ENV_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*KLACK=(?:"SESS:([^"]+)"|'SESS:([^']+)'|SESS:(\S+))\s+"#)
        .expect("env token regex")
});

static COMMENT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\s*SESS:([A-Za-z0-9_,\s-]+?)\s*$").expect("comment token regex"));

/// An unpoison token extracted from a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpoisonToken {
    pub codes: Vec<String>,
    pub source: UnpoisonSource,
}

/// Parse an unpoison token out of a shell command, if present. The env
/// prefix form wins when both appear.
pub fn parse_unpoison_token(command: &str) -> Option<UnpoisonToken> {
    if let Some(captures) = ENV_TOKEN.captures(command) {
        let raw = captures
            .get(1)
            .or_else(|| captures.get(2))
            .or_else(|| captures.get(3))?
            .as_str();
        let codes = split_codes(raw);
        if !codes.is_empty() {
            return Some(UnpoisonToken {
                codes,
                source: UnpoisonSource::EnvVar,
            });
        }
    }

    if let Some(captures) = COMMENT_TOKEN.captures(command) {
        let codes = split_codes(captures.get(1)?.as_str());
        if !codes.is_empty() {
            return Some(UnpoisonToken {
                codes,
                source: UnpoisonSource::Comment,
            });
        }
    }

    None
}

fn split_codes(raw: &str) -> Vec<String> {
    let mut codes = Vec::new();
    for code in raw.split(',') {
        let code = code.trim();
        if !code.is_empty() && !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
    }
    codes
}

/// Result of the fast-fail check at the start of event processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    /// Session tracking is off, the event has no session id, or the store
    /// is unavailable.
    Inactive,
    Clean,
    Poisoned { codes: Vec<String> },
}

/// Owns the poison state machine. Store failures degrade to
/// [`SessionCheck::Inactive`] - an unreachable state file must never
/// block the user.
pub struct SessionManager {
    store: Arc<dyn StateStore>,
    audit: Arc<dyn AuditSink>,
    max_age: Duration,
    enabled: bool,
}

impl SessionManager {
    pub fn new(store: Arc<dyn StateStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            max_age: Duration::hours(DEFAULT_MAX_SESSION_AGE_HOURS),
            enabled: true,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fast-fail check. Expired records are purged on read and treated as
    /// absent.
    pub fn check(&self, session_id: &str) -> SessionCheck {
        if !self.enabled {
            return SessionCheck::Inactive;
        }
        let state = match self.store.get(session_id) {
            Ok(state) => state,
            Err(err) => {
                warn!(%err, "session store unavailable; session tracking disabled for this event");
                return SessionCheck::Inactive;
            }
        };
        let Some(state) = state else {
            return SessionCheck::Clean;
        };

        if Utc::now() - state.poisoned_at > self.max_age {
            debug!(session_id, "poison record expired; purging");
            let _ = self.store.delete(session_id);
            return SessionCheck::Clean;
        }

        if state.poisoned && !state.poison_codes.is_empty() {
            SessionCheck::Poisoned {
                codes: state.poison_codes,
            }
        } else {
            SessionCheck::Clean
        }
    }

    /// Record a blocking failure against the session.
    pub fn poison(&self, session_id: &str, codes: Vec<String>, message: Option<String>, hook: &HookContext) {
        if !self.enabled || codes.is_empty() {
            return;
        }
        let now = Utc::now();
        let state = match self.store.get(session_id) {
            Ok(Some(mut state)) => {
                for code in &codes {
                    if !state.poison_codes.contains(code) {
                        state.poison_codes.push(code.clone());
                    }
                }
                state.poisoned = true;
                state.last_updated = now;
                state
            }
            Ok(None) => SessionState::poisoned_with(codes.clone(), now),
            Err(err) => {
                warn!(%err, "session store unavailable; skipping poison");
                return;
            }
        };
        if let Err(err) = self.store.put(session_id, state) {
            warn!(%err, "failed to persist session poison");
            return;
        }

        self.audit_entry(AuditEntry {
            timestamp: now,
            action: AuditAction::Poison,
            session_id: session_id.to_string(),
            poison_codes: codes,
            poison_message: message,
            source: None,
            command: hook.command().map(str::to_string),
            working_dir: Some(hook.cwd.display().to_string()),
        });
    }

    /// Apply an unpoison token found in `command`, if any. Returns the
    /// token when one was recognized, whether or not the session was
    /// actually poisoned (reapplication is an audited no-op).
    pub fn try_unpoison(&self, session_id: &str, command: &str, cwd: &Path) -> Option<UnpoisonToken> {
        if !self.enabled {
            return None;
        }
        let token = parse_unpoison_token(command)?;

        match self.store.get(session_id) {
            Ok(Some(mut state)) => {
                state.poison_codes.retain(|code| !token.codes.contains(code));
                state.last_updated = Utc::now();
                let result = if state.poison_codes.is_empty() {
                    self.store.delete(session_id)
                } else {
                    state.poisoned = true;
                    self.store.put(session_id, state)
                };
                if let Err(err) = result {
                    warn!(%err, "failed to persist session unpoison");
                }
            }
            Ok(None) => debug!(session_id, "unpoison token on a clean session"),
            Err(err) => {
                warn!(%err, "session store unavailable; skipping unpoison");
                return Some(token);
            }
        }

        self.audit_entry(AuditEntry {
            timestamp: Utc::now(),
            action: AuditAction::Unpoison,
            session_id: session_id.to_string(),
            poison_codes: token.codes.clone(),
            poison_message: None,
            source: Some(token.source),
            command: Some(command.to_string()),
            working_dir: Some(cwd.display().to_string()),
        });

        Some(token)
    }

    fn audit_entry(&self, entry: AuditEntry) {
        if let Err(err) = self.audit.append(&entry) {
            warn!(%err, "failed to write session audit entry");
        }
    }
}
