//! Layered TOML configuration.
//!
//! Precedence, highest first: CLI overrides > environment variables >
//! project `.klack/config.toml` > global `~/.klack/config.toml` >
//! built-in defaults. Files merge at the section level; rule lists
//! concatenate (global first, project after). The merged configuration is
//! immutable for the duration of an event.
//!
//! Load-time validation refuses to run on invalid rule patterns and on
//! world-writable config files.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::rules::RuleConfig;

/// Name of the per-directory and per-user config directory.
pub const CONFIG_DIR: &str = ".klack";
/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";
/// Environment kill switch: any non-empty value disables the dispatcher.
pub const ENV_DISABLED: &str = "KLACK_DISABLED";
/// Environment override for the config file path.
pub const ENV_CONFIG: &str = "KLACK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub enabled: bool,
    /// Per-validator deadline override, seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub enabled: bool,
    /// Path to the session state file; `~` expands to the home directory.
    pub state_file: Option<String>,
    pub max_session_age_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            state_file: None,
            max_session_age_hours: 24,
        }
    }
}

impl SessionConfig {
    pub fn state_file_path(&self) -> PathBuf {
        match &self.state_file {
            Some(path) => expand_home(path),
            None => default_state_dir().join("session_state.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub log_file: Option<String>,
    pub max_size_mb: u64,
    pub max_age_days: i64,
    pub max_backups: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_file: None,
            max_size_mb: 10,
            max_age_days: 30,
            max_backups: 5,
        }
    }
}

impl AuditConfig {
    pub fn log_file_path(&self) -> PathBuf {
        match &self.log_file {
            Some(path) => expand_home(path),
            None => default_state_dir().join("session_audit.jsonl"),
        }
    }
}

/// The merged configuration the engine runs with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KlackConfig {
    pub enabled: bool,
    /// Default per-validator deadline, seconds.
    pub default_timeout_secs: u64,
    /// Optional deadline for the whole event, seconds.
    pub event_timeout_secs: Option<u64>,
    pub validators: BTreeMap<String, ValidatorConfig>,
    #[serde(rename = "rule")]
    pub rules: Vec<RuleConfig>,
    pub session: SessionConfig,
    pub audit: AuditConfig,
}

impl Default for KlackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_timeout_secs: 10,
            event_timeout_secs: None,
            validators: BTreeMap::new(),
            rules: Vec::new(),
            session: SessionConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl KlackConfig {
    pub fn validator_enabled(&self, name: &str) -> bool {
        self.validators.get(name).map(|v| v.enabled).unwrap_or(true)
    }

    /// Load the layered configuration: defaults, then the global file,
    /// then the project file under `cwd`, then environment variables. An
    /// explicit path (CLI `--config` or `KLACK_CONFIG`) replaces file
    /// discovery entirely.
    pub fn load(cwd: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));
        match explicit {
            Some(path) => {
                config.merge_file(&path)?;
            }
            None => {
                if let Some(home) = dirs::home_dir() {
                    let global = home.join(CONFIG_DIR).join(CONFIG_FILE);
                    if global.exists() {
                        config.merge_file(&global)?;
                    }
                }
                let project = cwd.join(CONFIG_DIR).join(CONFIG_FILE);
                if project.exists() {
                    config.merge_file(&project)?;
                }
            }
        }

        if std::env::var(ENV_DISABLED).is_ok_and(|v| !v.is_empty()) {
            config.enabled = false;
        }

        Ok(config)
    }

    /// Merge one config file into `self` at the section level.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        check_permissions(path)?;
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: ConfigOverlay =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "merging config layer");
        self.apply(overlay);
        Ok(())
    }

    fn apply(&mut self, overlay: ConfigOverlay) {
        if let Some(enabled) = overlay.enabled {
            self.enabled = enabled;
        }
        if let Some(secs) = overlay.default_timeout_secs {
            self.default_timeout_secs = secs;
        }
        if let Some(secs) = overlay.event_timeout_secs {
            self.event_timeout_secs = Some(secs);
        }
        for (name, validator) in overlay.validators {
            self.validators.insert(name, validator);
        }
        self.rules.extend(overlay.rules);
        if let Some(session) = overlay.session {
            self.session = session;
        }
        if let Some(audit) = overlay.audit {
            self.audit = audit;
        }
    }
}

/// Partial view of one config file; unset sections leave the lower layer
/// untouched.
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    enabled: Option<bool>,
    default_timeout_secs: Option<u64>,
    event_timeout_secs: Option<u64>,
    #[serde(default)]
    validators: BTreeMap<String, ValidatorConfig>,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleConfig>,
    session: Option<SessionConfig>,
    audit: Option<AuditConfig>,
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;

    let meta = std::fs::metadata(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if meta.permissions().mode() & 0o002 != 0 {
        return Err(ConfigError::InsecurePermissions(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}
