//! Conventional-commit message parsing.

use std::sync::LazyLock;

use regex::Regex;

/// Commit types accepted by default.
pub const DEFAULT_TYPES: &[&str] = &[
    "build", "chore", "ci", "docs", "feat", "fix", "perf", "refactor", "revert", "style", "test",
];

/// Maximum title length before the commit is rejected.
pub const MAX_TITLE_LEN: usize = 72;

static TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+)(?:\(([A-Za-z0-9_/-]+)\))?(!)?: (.+)$").expect("title regex")
});

static REVERT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^Revert ".+"$"#).expect("revert regex"));

/// Git trailer line: `Token: value`.
static TRAILER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9-]+(?: [A-Z]+)?):\s*(.*)$").expect("trailer regex"));

/// Parsed conventional commit title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub kind: String,
    pub scope: Option<String>,
    pub breaking: bool,
    pub description: String,
}

/// Parse the first line of a commit message. `None` means the title does
/// not follow the `type(scope)!: description` shape at all.
pub fn parse_title(title: &str) -> Option<ParsedTitle> {
    let captures = TITLE.captures(title)?;
    Some(ParsedTitle {
        kind: captures[1].to_string(),
        scope: captures.get(2).map(|m| m.as_str().to_string()),
        breaking: captures.get(3).is_some(),
        description: captures[4].to_string(),
    })
}

/// `git revert` generates `Revert "original title"` messages; those pass
/// format validation as-is.
pub fn is_revert(title: &str) -> bool {
    REVERT.is_match(title)
}

/// First line of a message.
pub fn title_of(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}

/// Whether the message body ends in a block of git trailers containing a
/// breaking-change marker.
pub fn has_breaking_trailer(message: &str) -> bool {
    message
        .lines()
        .rev()
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| TRAILER.captures(line.trim()))
        .any(|captures| matches!(&captures[1], "BREAKING CHANGE" | "BREAKING-CHANGE"))
}
