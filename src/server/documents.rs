// SPDX-License-Identifier: MIT
//! Open-document store.
//!
//! Documents are keyed by uri and mutated only through the open/change/close
//! path. The transport does not validate version monotonicity — that
//! invariant lives here: a change carrying a version that does not move
//! forward is rejected (logged, not a fault).

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use tracing::{debug, warn};

use crate::protocol::{Position, TextDocumentContentChangeEvent, TextDocumentItem};

#[derive(Debug, Clone)]
pub struct Document {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

#[derive(Default)]
pub struct DocumentStore {
    docs: Mutex<HashMap<String, Document>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a document from a `didOpen` notification.
    pub fn open(&self, item: TextDocumentItem) -> Document {
        let doc = Document {
            uri: item.uri.clone(),
            language_id: item.language_id,
            version: item.version,
            text: item.text,
        };
        debug!(uri = %doc.uri, version = doc.version, "document opened");
        self.docs
            .lock()
            .expect("document store poisoned")
            .insert(item.uri, doc.clone());
        doc
    }

    /// Apply `didChange` events in order.
    ///
    /// Returns the updated document, or `None` when the version does not
    /// advance past the stored one — the change is dropped in that case.
    pub fn apply_changes(
        &self,
        uri: &str,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Result<Option<Document>> {
        let mut docs = self.docs.lock().expect("document store poisoned");
        let doc = docs
            .get_mut(uri)
            .ok_or_else(|| anyhow::anyhow!("document not open: {uri}"))?;

        if version <= doc.version {
            warn!(
                uri = %uri,
                stored = doc.version,
                received = version,
                "stale didChange version — dropped"
            );
            return Ok(None);
        }

        for change in changes {
            doc.text = match change.range {
                None => change.text.clone(),
                Some(range) => apply_ranged_change(&doc.text, range.start, range.end, &change.text),
            };
        }
        doc.version = version;
        debug!(uri = %uri, version, "document changed");
        Ok(Some(doc.clone()))
    }

    /// Remove a closed document. Returns whether it was open.
    pub fn close(&self, uri: &str) -> bool {
        self.docs
            .lock()
            .expect("document store poisoned")
            .remove(uri)
            .is_some()
    }

    pub fn get(&self, uri: &str) -> Option<Document> {
        self.docs
            .lock()
            .expect("document store poisoned")
            .get(uri)
            .cloned()
    }
}

/// Splice one ranged edit into `text`. Positions beyond the end of a line or
/// of the document clamp instead of failing — editors routinely send a range
/// end one past the last character.
fn apply_ranged_change(text: &str, start: Position, end: Position, replacement: &str) -> String {
    let start_off = offset_at(text, start);
    let end_off = offset_at(text, end).max(start_off);
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..start_off]);
    out.push_str(replacement);
    out.push_str(&text[end_off..]);
    out
}

/// Convert line/character coordinates into a byte offset, clamped to the
/// document and to char boundaries.
pub fn offset_at(text: &str, position: Position) -> usize {
    let mut offset = 0;
    for (i, line) in text.split('\n').enumerate() {
        if i as u32 == position.line {
            let mut col = (position.character as usize).min(line.len());
            while col > 0 && !line.is_char_boundary(col) {
                col -= 1;
            }
            return offset + col;
        }
        offset += line.len() + 1;
    }
    text.len()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
