//! Edits and fix providers
//!
//! A [`FixProvider`] turns one diagnostic into at most one candidate
//! [`Edit`]. Edits are composed by the batch engine into a single
//! conflict-free rewrite per file via [`apply_edits`].

use crate::diagnostic::Diagnostic;
use crate::options::Options;
use crate::rule::RuleError;
use crate::span::Span;
use crate::tree::SourceTree;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Identifier shared by every edit of one rename transaction.
pub type TransactionId = u64;

/// A span replacement (delete + insert) against one tree version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edit {
    /// File the edit applies to
    pub file: PathBuf,
    /// Replaced span
    pub span: Span,
    /// Replacement text (empty = pure deletion)
    pub replacement: String,
    /// Rule that produced the originating diagnostic
    pub rule_id: String,
    /// Registration order within one batch session; first registered wins
    /// offset ties
    pub seq: usize,
    /// Tree version the span was computed against
    pub tree_version: u32,
    /// Rename transaction this edit belongs to, if any
    pub transaction: Option<TransactionId>,
}

impl Edit {
    pub fn new(tree: &SourceTree, span: Span, replacement: impl Into<String>, rule_id: &str) -> Self {
        Self {
            file: tree.path().to_path_buf(),
            span,
            replacement: replacement.into(),
            rule_id: rule_id.to_string(),
            seq: 0,
            tree_version: tree.version(),
            transaction: None,
        }
    }

    pub fn in_transaction(mut self, id: TransactionId) -> Self {
        self.transaction = Some(id);
        self
    }

    /// Whether applying both edits in one pass would be unsound.
    pub fn conflicts_with(&self, other: &Edit) -> bool {
        self.file == other.file && self.span.overlaps(&other.span)
    }
}

/// Error applying a composite rewrite.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("edit span {start}..{end} is out of bounds (text length {len})")]
    OutOfBounds { start: u32, end: u32, len: usize },

    #[error("overlapping edits at offset {0}")]
    Overlap(u32),

    #[error("edit computed against tree version {edit}, tree is at version {tree}")]
    StaleVersion { edit: u32, tree: u32 },
}

/// Computes a candidate edit for a specific diagnostic.
///
/// `Ok(None)` is the refusal sentinel: the provider recognizes the
/// diagnostic but has no fix for this instance.
pub trait FixProvider: Send + Sync {
    fn compute_fix(
        &self,
        tree: &SourceTree,
        diagnostic: &Diagnostic,
        options: &Options,
    ) -> Result<Option<Edit>, RuleError>;
}

/// Apply edits to `text` as one composite rewrite.
///
/// Edits must be sorted by start offset and pairwise non-overlapping;
/// violations are errors, never silent partial application.
pub fn apply_edits(text: &str, edits: &[Edit]) -> Result<String, EditError> {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    for edit in edits {
        let start = edit.span.start as usize;
        let end = edit.span.end as usize;

        if edit.span.is_none() || end > text.len() || !text.is_char_boundary(start) || !text.is_char_boundary(end)
        {
            return Err(EditError::OutOfBounds {
                start: edit.span.start,
                end: edit.span.end,
                len: text.len(),
            });
        }
        if start < cursor {
            return Err(EditError::Overlap(edit.span.start));
        }

        out.push_str(&text[cursor..start]);
        out.push_str(&edit.replacement);
        cursor = end;
    }

    out.push_str(&text[cursor..]);
    Ok(out)
}

/// Order candidate edits for the acceptance sweep: start offset first,
/// registration order as the tie break.
pub fn sort_candidates(edits: &mut [Edit]) {
    edits.sort_by(|a, b| a.span.start.cmp(&b.span.start).then(a.seq.cmp(&b.seq)));
}
