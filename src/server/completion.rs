// SPDX-License-Identifier: MIT
//! SQL completion and hover lookups.
//!
//! Pure functions over the document text — no ranking, no statistics, just
//! prefix-filtered keywords plus table names from the configured connections
//! when the cursor sits in a table position (after FROM/JOIN/INTO/UPDATE).

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::protocol::{
    CompletionItem, Position, COMPLETION_KIND_CLASS, COMPLETION_KIND_KEYWORD,
};
use crate::server::documents::offset_at;

/// Keywords offered as completions.
pub const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "INSERT", "INTO", "VALUES", "UPDATE", "SET", "DELETE", "JOIN",
    "INNER", "LEFT", "RIGHT", "OUTER", "ON", "GROUP", "BY", "ORDER", "HAVING", "LIMIT", "OFFSET",
    "AND", "OR", "NOT", "NULL", "AS", "DISTINCT", "UNION", "CREATE", "TABLE", "DROP", "ALTER",
];

/// Keywords that put the *next* word in table position.
const TABLE_CONTEXT: &[&str] = &["FROM", "JOIN", "INTO", "UPDATE", "TABLE"];

/// Short hover blurbs for the common keywords.
static KEYWORD_DOCS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("SELECT", "Retrieves rows from one or more tables."),
        ("FROM", "Names the table(s) a query reads from."),
        ("WHERE", "Filters rows by a boolean condition."),
        ("JOIN", "Combines rows from two tables on a join condition."),
        ("GROUP", "Groups rows sharing values for aggregation."),
        ("ORDER", "Sorts the result set."),
        ("INSERT", "Adds new rows to a table."),
        ("UPDATE", "Modifies existing rows in a table."),
        ("DELETE", "Removes rows from a table."),
        ("LIMIT", "Caps the number of returned rows."),
    ])
});

/// Completion candidates at `position` in `text`.
pub fn complete_at(text: &str, position: Position, tables: &[String]) -> Vec<CompletionItem> {
    let offset = offset_at(text, position);
    let before_cursor = &text[..offset];
    let word = current_word(before_cursor);
    let in_table_position = is_table_context(before_cursor, word);

    let mut items = Vec::new();

    if in_table_position {
        for table in tables {
            if starts_with_ci(table, word) {
                items.push(CompletionItem {
                    label: table.clone(),
                    kind: COMPLETION_KIND_CLASS,
                    detail: Some("table".to_string()),
                });
            }
        }
    }

    // Keywords are always on offer; after FROM they rank behind the tables.
    for kw in KEYWORDS {
        if starts_with_ci(kw, word) {
            items.push(CompletionItem {
                label: (*kw).to_string(),
                kind: COMPLETION_KIND_KEYWORD,
                detail: None,
            });
        }
    }

    items
}

/// Hover text for the word under `position`, if we know anything about it.
pub fn hover_at(text: &str, position: Position, tables: &[String]) -> Option<String> {
    let offset = offset_at(text, position);
    let word = word_around(text, offset);
    if word.is_empty() {
        return None;
    }
    if let Some(doc) = KEYWORD_DOCS.get(word.to_uppercase().as_str()) {
        return Some(format!("{} — {}", word.to_uppercase(), doc));
    }
    if tables.iter().any(|t| t.eq_ignore_ascii_case(word)) {
        return Some(format!("table {word}"));
    }
    None
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// The partial word immediately before the cursor.
fn current_word(before_cursor: &str) -> &str {
    let bytes = before_cursor.as_bytes();
    let mut start = bytes.len();
    while start > 0 && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    &before_cursor[start..]
}

/// The full word spanning `offset` (for hover).
fn word_around(text: &str, offset: usize) -> &str {
    let bytes = text.as_bytes();
    let mut start = offset.min(bytes.len());
    while start > 0 && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = offset.min(bytes.len());
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    &text[start..end]
}

/// Whether the token preceding the current word is one that introduces a
/// table name.
fn is_table_context(before_cursor: &str, word: &str) -> bool {
    let before_word = &before_cursor[..before_cursor.len() - word.len()];
    match before_word
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .last()
    {
        Some(prev) => TABLE_CONTEXT
            .iter()
            .any(|kw| kw.eq_ignore_ascii_case(prev)),
        None => false,
    }
}

fn starts_with_ci(candidate: &str, prefix: &str) -> bool {
    candidate.len() >= prefix.len()
        && candidate[..prefix.len()].eq_ignore_ascii_case(prefix)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
