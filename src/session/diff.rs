// SPDX-License-Identifier: MIT
//! Incremental text diff.
//!
//! Derives the minimal single-range replacement between two versions of a
//! document: longest common prefix, then longest common suffix bounded so the
//! two regions never overlap, and everything in between is the edit. The
//! result travels as one change event in a `textDocument/didChange`
//! notification instead of retransmitting the whole document.

use crate::protocol::{position_at, Range, TextDocumentContentChangeEvent};

/// Length in bytes of the longest common prefix, clamped to a UTF-8 char
/// boundary in both strings.
pub fn common_prefix(old: &str, new: &str) -> usize {
    let (a, b) = (old.as_bytes(), new.as_bytes());
    let mut p = 0;
    while p < a.len() && p < b.len() && a[p] == b[p] {
        p += 1;
    }
    while p > 0 && (!old.is_char_boundary(p) || !new.is_char_boundary(p)) {
        p -= 1;
    }
    p
}

/// Length in bytes of the longest common suffix of the substrings after a
/// prefix of length `p`. The scan stops at the prefix boundary, so prefix and
/// suffix never double-count a character (`"aa"` → `"aaa"` keeps `s = 0` from
/// eating into the prefix). Clamped to a char boundary in both strings.
pub fn common_suffix(old: &str, new: &str, p: usize) -> usize {
    let (a, b) = (old.as_bytes(), new.as_bytes());
    let mut s = 0;
    while s < a.len() - p && s < b.len() - p && a[a.len() - s - 1] == b[b.len() - s - 1] {
        s += 1;
    }
    while s > 0 && (!old.is_char_boundary(a.len() - s) || !new.is_char_boundary(b.len() - s)) {
        s -= 1;
    }
    s
}

/// Compute the single change event describing the edit from `old` to `new`.
///
/// Identical inputs yield an empty range with empty text; wholly disjoint
/// inputs replace the entire document. The range end is derived from the new
/// text's length — the behavior editors have been fed all along, kept as-is
/// rather than re-anchored to the old text.
pub fn content_change(old: &str, new: &str) -> TextDocumentContentChangeEvent {
    let p = common_prefix(old, new);
    let s = common_suffix(old, new, p);

    let start = position_at(old, p);
    let end = position_at(new, new.len() - s);

    TextDocumentContentChangeEvent {
        range: Some(Range::new(start, end)),
        text: new[p..new.len() - s].to_string(),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
