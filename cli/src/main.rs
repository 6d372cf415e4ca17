//! klack - validation dispatcher for developer-tool hooks.
//!
//! The host invokes `klack` around each tool operation with a JSON event
//! on stdin (or in `CLAUDE_TOOL_INPUT`). Exit status reports the
//! decision: 0 allow/warn, 2 block, 1 for parse/config/internal errors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use anyhow::Result;
use clap::Parser;
use clap::ValueEnum;
use klack_core::ParseError;
use klack_core::capabilities::Capabilities;
use klack_core::config::KlackConfig;
use klack_core::dispatcher::Dispatcher;
use klack_core::event;
use klack_core::event::EventKind;
use klack_core::executor::CategoryPools;
use klack_core::executor::Executor;
use klack_core::registry::Registry;
use klack_core::rules::RuleEngine;
use klack_core::session::AuditLogger;
use klack_core::session::FileStateStore;
use klack_core::session::SessionManager;
use klack_core::validators::builtin_registry;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status for parse, configuration, and internal errors - distinct
/// from the blocking status 2.
const EXIT_ERROR: i32 = 1;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EventArg {
    PreToolUse,
    PostToolUse,
    Notification,
}

impl From<EventArg> for EventKind {
    fn from(arg: EventArg) -> Self {
        match arg {
            EventArg::PreToolUse => EventKind::PreToolUse,
            EventArg::PostToolUse => EventKind::PostToolUse,
            EventArg::Notification => EventKind::Notification,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "klack", about = "Validation dispatcher for developer-tool hooks", version)]
struct Cli {
    /// Event kind, for hosts that do not set event_type in the payload.
    #[arg(value_enum)]
    event: Option<EventArg>,

    /// Explicit config file; replaces the global/project discovery.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Event payload; bypasses stdin.
    #[arg(long)]
    payload: Option<String>,

    /// Working directory of the tool operation; defaults to the current
    /// directory.
    #[arg(long)]
    cwd: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Diagnostics go to stderr so the rendered verdict stays the only
    // stdout/stderr contract with the host; default level keeps normal
    // runs silent.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("KLACK_LOG").unwrap_or_else(|_| EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("klack: {err:#}");
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let cwd = match cli.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().context("cannot determine working directory")?,
    };

    let config = KlackConfig::load(&cwd, cli.config.as_deref()).context("loading configuration")?;
    if !config.enabled {
        debug!("dispatcher disabled by configuration");
        return Ok(0);
    }

    let payload = match cli.payload {
        Some(payload) => payload,
        None => match event::read_payload(&mut std::io::stdin().lock()) {
            Ok(payload) => payload,
            Err(err @ ParseError::Empty) => {
                eprintln!("klack: {err}");
                return Ok(EXIT_ERROR);
            }
            Err(err) => return Err(err.into()),
        },
    };

    let hook = match event::parse_payload(&payload, cli.event.map(EventKind::from), cwd.clone()) {
        Ok(hook) => hook,
        Err(err) => {
            eprintln!("klack: invalid event payload: {err}");
            return Ok(EXIT_ERROR);
        }
    };

    let dispatcher = build_dispatcher(&config)?;
    let outcome = dispatcher.dispatch(&hook).await;
    eprint!("{}", outcome.rendered);
    Ok(outcome.verdict.exit_code())
}

fn build_dispatcher(config: &KlackConfig) -> Result<Dispatcher> {
    let caps = Capabilities::system();

    let rules = RuleEngine::compile(&config.rules).context("compiling rules")?;

    let registry: Registry = builtin_registry(config);

    let mut executor = Executor::new(CategoryPools::from_host())
        .with_default_timeout(Duration::from_secs(config.default_timeout_secs));
    if let Some(secs) = config.event_timeout_secs {
        executor = executor.with_event_deadline(Duration::from_secs(secs));
    }
    for (name, validator) in &config.validators {
        if let Some(secs) = validator.timeout_secs {
            executor = executor.with_timeout_override(name.clone(), Duration::from_secs(secs));
        }
    }

    let audit = config.audit.clone();
    let session = SessionManager::new(
        Arc::new(FileStateStore::new(config.session.state_file_path())),
        Arc::new(AuditLogger::new(
            audit.log_file_path(),
            audit.enabled,
            audit.max_size_mb,
            audit.max_age_days,
            audit.max_backups,
        )),
    )
    .with_enabled(config.session.enabled)
    .with_max_age(chrono::Duration::hours(config.session.max_session_age_hours));

    Ok(Dispatcher::new(
        registry,
        rules,
        executor,
        Arc::new(session),
        caps,
    ))
}
