//! Renders the aggregate result to the stderr diagnostic format.
//!
//! One renderer serves both rule- and validator-produced results;
//! individual validators never format final output. The layout:
//!
//! ```text
//! Failed: validate-commit
//!
//!   [validate-commit]
//!   ✖ GIT010: Add -sS flags to your commit command
//!
//!   [Fix:
//!    git commit -sS ...]
//!
//!   Reference: https://...
//! ```
//!
//! A `warn` verdict renders the same sections without the `Failed:`
//! header; `allow` renders nothing at all.

use crate::dispatcher::Verdict;
use crate::result::ValidationResult;

/// Render the aggregate. The output is a pure function of the verdict and
/// the (already name-sorted) result list.
pub fn render(verdict: Verdict, results: &[ValidationResult]) -> String {
    if verdict == Verdict::Allow {
        return String::new();
    }

    let visible: Vec<&ValidationResult> = results
        .iter()
        .filter(|r| !r.passed() && !r.suppressed())
        .collect();
    if visible.is_empty() {
        return String::new();
    }

    let mut out = String::new();

    if verdict == Verdict::Block {
        let failed: Vec<&str> = visible
            .iter()
            .filter(|r| r.should_block())
            .map(|r| r.validator.as_str())
            .collect();
        if !failed.is_empty() {
            out.push_str("Failed: ");
            out.push_str(&failed.join(", "));
            out.push_str("\n\n");
        }
    }

    for (index, result) in visible.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        render_section(&mut out, result);
    }

    out
}

fn render_section(out: &mut String, result: &ValidationResult) {
    out.push_str(&format!("  [{}]\n", result.validator));

    for finding in &result.findings {
        match finding.line {
            Some(line) => out.push_str(&format!("  [Line {line}] {}", finding.severity.glyph())),
            None => out.push_str(&format!("  {}", finding.severity.glyph())),
        }
        match &finding.code {
            Some(code) => out.push_str(&format!(" {code}: {}\n", finding.message)),
            None => out.push_str(&format!(" {}\n", finding.message)),
        }
    }

    for finding in &result.findings {
        let Some(fix) = &finding.fix else {
            continue;
        };
        out.push('\n');
        match finding.line {
            Some(line) => out.push_str(&format!("  [Fix for line {line}:\n")),
            None => out.push_str("  [Fix:\n"),
        }
        for line in fix.lines() {
            out.push_str(&format!("   {line}\n"));
        }
        // Close the bracket on the last fix line.
        if out.ends_with('\n') {
            out.pop();
        }
        out.push_str("]\n");
    }

    let references = dedup_references(result);
    match references.len() {
        0 => {}
        1 => out.push_str(&format!("\n  Reference: {}\n", references[0])),
        _ => {
            out.push_str("\n  References:\n");
            for reference in references {
                out.push_str(&format!("  - {reference}\n"));
            }
        }
    }
}

fn dedup_references(result: &ValidationResult) -> Vec<&str> {
    let mut seen = Vec::new();
    for reference in &result.references {
        if !seen.contains(&reference.as_str()) {
            seen.push(reference.as_str());
        }
    }
    seen
}
