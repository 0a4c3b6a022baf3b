// SPDX-License-Identifier: MIT
//! Naive SQL diagnostics.
//!
//! Cheap textual checks run on every open/change — no parser involved. Two
//! findings: an unclosed single-quoted string literal, and a statement whose
//! leading keyword we do not recognize.

use crate::protocol::{position_at, Diagnostic, Range, SEVERITY_ERROR, SEVERITY_WARNING};

const DIAGNOSTIC_SOURCE: &str = "sqld";

/// Statement-leading keywords we accept without comment.
const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "WITH", "EXPLAIN",
    "BEGIN", "COMMIT", "ROLLBACK", "PRAGMA", "VACUUM",
];

/// Analyze a document's full text.
pub fn analyze(text: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if let Some(offset) = unclosed_quote(text) {
        let start = position_at(text, offset);
        diagnostics.push(Diagnostic {
            range: Range::new(start, position_at(text, text.len())),
            severity: SEVERITY_ERROR,
            source: DIAGNOSTIC_SOURCE.to_string(),
            message: "unclosed string literal".to_string(),
        });
    }

    if let Some(word) = leading_word(text) {
        let known = STATEMENT_KEYWORDS
            .iter()
            .any(|kw| kw.eq_ignore_ascii_case(word));
        if !known {
            let start = text.len() - text.trim_start().len();
            diagnostics.push(Diagnostic {
                range: Range::new(
                    position_at(text, start),
                    position_at(text, start + word.len()),
                ),
                severity: SEVERITY_WARNING,
                source: DIAGNOSTIC_SOURCE.to_string(),
                message: format!("unrecognized statement: {word}"),
            });
        }
    }

    diagnostics
}

/// Byte offset of the opening quote of an unterminated string, if any.
/// `''` inside a literal is the SQL escape for a single quote.
fn unclosed_quote(text: &str) -> Option<usize> {
    let mut open: Option<usize> = None;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\'' {
            open = match open {
                None => Some(i),
                Some(_) => None,
            };
        }
    }
    open
}

/// First word of the statement, if there is one.
fn leading_word(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();
    let word = trimmed
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .next()
        .unwrap_or("");
    if word.is_empty() {
        None
    } else {
        Some(word)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Position;

    #[test]
    fn clean_statement_has_no_findings() {
        assert!(analyze("select * from users").is_empty());
        assert!(analyze("SELECT name FROM t WHERE x = 'it''s'").is_empty());
    }

    #[test]
    fn empty_text_has_no_findings() {
        assert!(analyze("").is_empty());
        assert!(analyze("   \n").is_empty());
    }

    #[test]
    fn partial_statement_is_still_clean() {
        // The demo session's intermediate state must not be flagged.
        assert!(analyze("select * fr").is_empty());
    }

    #[test]
    fn unclosed_literal_is_an_error() {
        let found = analyze("select * from t where name = 'alice");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, SEVERITY_ERROR);
        assert_eq!(found[0].range.start, Position::new(0, 29));
        assert_eq!(found[0].message, "unclosed string literal");
    }

    #[test]
    fn unknown_leading_keyword_is_a_warning() {
        let found = analyze("selekt * from users");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, SEVERITY_WARNING);
        assert!(found[0].message.contains("selekt"));
    }

    #[test]
    fn leading_whitespace_is_ignored() {
        assert!(analyze("   select 1").is_empty());
        let found = analyze("  frobnicate");
        assert_eq!(found[0].range.start, Position::new(0, 2));
    }
}
