//! Hook event model and payload parsing.
//!
//! The host delivers one JSON event per invocation, either on stdin or via
//! the `CLAUDE_TOOL_INPUT` environment variable when stdin is empty. The
//! parser normalizes the payload into a [`HookContext`], the single input
//! the rest of the engine operates on.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ParseError;

/// Environment variable consulted when stdin carries no payload.
pub const PAYLOAD_ENV_VAR: &str = "CLAUDE_TOOL_INPUT";

/// Lifecycle point at which the host invokes the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PreToolUse,
    PostToolUse,
    Notification,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::Notification => "Notification",
        }
    }

    /// Parse an event name as it appears in payloads (`PreToolUse`) or on
    /// the command line (`pre-tool-use`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PreToolUse" | "pre-tool-use" => Some(Self::PreToolUse),
            "PostToolUse" | "post-tool-use" => Some(Self::PostToolUse),
            "Notification" | "notification" => Some(Self::Notification),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool named by the event. Unrecognized tools are preserved verbatim so
/// predicates and rules can still match on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Bash,
    Write,
    Edit,
    MultiEdit,
    Read,
    Glob,
    Grep,
    Task,
    WebFetch,
    Other(String),
    /// Events that name no tool at all (notifications).
    Unknown,
}

impl ToolKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "Bash" => Self::Bash,
            "Write" => Self::Write,
            "Edit" => Self::Edit,
            "MultiEdit" => Self::MultiEdit,
            "Read" => Self::Read,
            "Glob" => Self::Glob,
            "Grep" => Self::Grep,
            "Task" => Self::Task,
            "WebFetch" => Self::WebFetch,
            "" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Bash => "Bash",
            Self::Write => "Write",
            Self::Edit => "Edit",
            Self::MultiEdit => "MultiEdit",
            Self::Read => "Read",
            Self::Glob => "Glob",
            Self::Grep => "Grep",
            Self::Task => "Task",
            Self::WebFetch => "WebFetch",
            Self::Other(name) => name,
            Self::Unknown => "",
        }
    }

    /// Tools that write file content the engine may want to inspect.
    pub fn is_file_mutation(&self) -> bool {
        matches!(self, Self::Write | Self::Edit | Self::MultiEdit)
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of the tool operation under validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_string: Option<String>,
}

impl ToolInput {
    pub fn is_empty(&self) -> bool {
        self.command.is_none()
            && self.file_path.is_none()
            && self.content.is_none()
            && self.old_string.is_none()
            && self.new_string.is_none()
    }

    /// File content carried by the operation: `content` for whole-file
    /// writes, `new_string` for edits.
    pub fn written_content(&self) -> Option<&str> {
        self.content.as_deref().or(self.new_string.as_deref())
    }

    /// Extension of `file_path`, lowercased, without the dot.
    pub fn file_extension(&self) -> Option<String> {
        let path = self.file_path.as_deref()?;
        Path::new(path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

/// Normalized event the engine validates against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    pub event: EventKind,
    pub tool: ToolKind,
    pub input: ToolInput,
    /// Opaque host session identifier; absent disables session tracking.
    pub session_id: Option<String>,
    /// Only set for `Notification` events.
    pub notification_type: Option<String>,
    /// Working directory the tool operation runs in.
    pub cwd: PathBuf,
    /// Original payload, retained for audit entries.
    pub raw: String,
}

impl HookContext {
    pub fn command(&self) -> Option<&str> {
        self.input.command.as_deref()
    }
}

/// Raw payload schema. Unknown top-level fields are ignored.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default, alias = "tool")]
    tool_name: Option<String>,
    #[serde(default)]
    tool_input: Option<serde_json::Value>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    notification_type: Option<String>,
}

/// Read the event payload from a reader, falling back to the
/// `CLAUDE_TOOL_INPUT` environment variable when the stream is empty.
pub fn read_payload(reader: &mut dyn std::io::Read) -> Result<String, ParseError> {
    let mut buf = String::new();
    reader
        .read_to_string(&mut buf)
        .map_err(|err| ParseError::Read(err.to_string()))?;

    if buf.trim().is_empty() {
        buf = std::env::var(PAYLOAD_ENV_VAR).unwrap_or_default();
    }

    if buf.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    Ok(buf)
}

/// Parse a JSON payload into a [`HookContext`].
///
/// `default_event` supplies the event kind for hosts that select it on the
/// command line instead of in the payload; the payload wins when both are
/// present.
pub fn parse_payload(
    raw: &str,
    default_event: Option<EventKind>,
    cwd: PathBuf,
) -> Result<HookContext, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let payload: RawEvent =
        serde_json::from_str(raw).map_err(|err| ParseError::InvalidJson(err.to_string()))?;

    let event = match payload.event_type.as_deref() {
        Some(name) => EventKind::parse(name).ok_or_else(|| ParseError::UnknownEvent(name.to_string()))?,
        None => default_event.ok_or(ParseError::MissingEvent)?,
    };

    let tool = payload
        .tool_name
        .as_deref()
        .map(ToolKind::parse)
        .unwrap_or(ToolKind::Unknown);

    // A malformed tool_input object degrades to the top-level command field
    // rather than failing the whole event.
    let input = match payload.tool_input {
        Some(value) => serde_json::from_value::<ToolInput>(value).unwrap_or_else(|_| ToolInput {
            command: payload.command.clone(),
            ..ToolInput::default()
        }),
        None => ToolInput {
            command: payload.command.clone(),
            ..ToolInput::default()
        },
    };

    if event != EventKind::Notification && input.is_empty() {
        return Err(ParseError::MissingToolInput);
    }

    Ok(HookContext {
        event,
        tool,
        input,
        session_id: payload.session_id.filter(|id| !id.is_empty()),
        notification_type: payload.notification_type,
        cwd,
        raw: raw.to_string(),
    })
}
