//! Shell command word helpers shared by the command-inspecting validators.
//!
//! This is deliberately not a shell parser. Commands are split into words
//! with `shlex` and segmented on the common connectors (`&&`, `||`, `;`,
//! `|`); that is enough to find `git commit` inside a compound command
//! line without executing anything. Constructs the splitter cannot see
//! through (subshells, process substitution) simply fall through to the
//! validators unsegmented.

/// Split a command line into connector-separated segments of words.
///
/// Returns an empty vec when the command cannot be tokenized (unbalanced
/// quotes); callers treat that as "nothing to inspect".
pub fn command_segments(command: &str) -> Vec<Vec<String>> {
    let Some(words) = shlex::split(command) else {
        return Vec::new();
    };

    let mut segments = Vec::new();
    let mut current = Vec::new();
    for word in words {
        if is_connector(&word) {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
        } else {
            current.push(word);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn is_connector(word: &str) -> bool {
    matches!(word, "&&" | "||" | ";" | "|" | "&")
}

/// `KEY=value` environment assignment preceding a command word.
pub fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !key.chars().next().is_some_and(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Strip leading environment assignments from a segment.
pub fn strip_env_prefix(words: &[String]) -> &[String] {
    let start = words
        .iter()
        .position(|w| !is_env_assignment(w))
        .unwrap_or(words.len());
    &words[start..]
}

/// A `git <subcommand>` invocation extracted from one command segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInvocation {
    pub subcommand: String,
    /// Words after the subcommand, flags and positionals interleaved in
    /// command order.
    pub rest: Vec<String>,
    /// Working directory from a `git -C <dir>` global option.
    pub cwd_override: Option<String>,
}

impl GitInvocation {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.rest.iter().any(|w| w == flag)
    }

    /// Value following `flag`, or the inline `--flag=value` form.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let inline = format!("{flag}=");
        for (i, word) in self.rest.iter().enumerate() {
            if word == flag {
                return self.rest.get(i + 1).map(String::as_str);
            }
            if let Some(value) = word.strip_prefix(&inline) {
                return Some(value);
            }
        }
        None
    }

    /// Positional arguments (words not starting with `-`, skipping values
    /// consumed by the given value-taking flags).
    pub fn positionals(&self, value_flags: &[&str]) -> Vec<&str> {
        let mut out = Vec::new();
        let mut skip_next = false;
        for word in &self.rest {
            if skip_next {
                skip_next = false;
                continue;
            }
            if word.starts_with('-') {
                if value_flags.contains(&word.as_str()) {
                    skip_next = true;
                }
                continue;
            }
            out.push(word.as_str());
        }
        out
    }
}

/// Git global options that take a separate value and may precede the
/// subcommand (`git -C /repo commit ...`).
fn is_git_global_option_with_value(word: &str) -> bool {
    matches!(word, "-C" | "-c" | "--git-dir" | "--work-tree" | "--namespace")
}

/// Extract every `git` invocation from a command line.
pub fn git_invocations(command: &str) -> Vec<GitInvocation> {
    let mut out = Vec::new();
    for segment in command_segments(command) {
        let words = strip_env_prefix(&segment);
        let Some((first, rest)) = words.split_first() else {
            continue;
        };
        if first != "git" {
            continue;
        }

        // Skip global options to find the subcommand, keeping the `-C`
        // working directory when present.
        let mut iter = rest.iter();
        let mut subcommand = None;
        let mut remainder = Vec::new();
        let mut cwd_override = None;
        while let Some(word) = iter.next() {
            if subcommand.is_none() {
                if is_git_global_option_with_value(word) {
                    let value = iter.next();
                    if word == "-C" {
                        cwd_override = value.cloned();
                    }
                    continue;
                }
                if word.starts_with('-') {
                    continue;
                }
                subcommand = Some(word.clone());
            } else {
                remainder.push(word.clone());
            }
        }

        if let Some(subcommand) = subcommand {
            out.push(GitInvocation {
                subcommand,
                rest: remainder,
                cwd_override,
            });
        }
    }
    out
}
