//! Atomic multi-location symbol rename
//!
//! A rename resolves the complete occurrence set of a symbol and turns it
//! into one [`RenameTransaction`]: every occurrence becomes an edit tagged
//! with a single transaction id. The transaction locks its file set at
//! resolution and holds the locks until it is committed or dropped, so a
//! batch fix pass can never rewrite a file out from under an in-flight
//! rename. Commit is all-or-nothing: every new tree is computed, version
//! checked and reparsed before any is swapped in, so a failure leaves
//! every file untouched.

use crate::fix::{apply_edits, Edit, EditError, TransactionId};
use crate::host::{Host, ParseError, Scope, SymbolId, SymbolLocation};
use crate::locks::{FileLocks, LockGuard};
use crate::tree::{NodeId, SourceTree};
use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Rule id carried by rename edits.
pub const RENAME_RULE: &str = "rename";

static NEXT_TRANSACTION: AtomicU64 = AtomicU64::new(1);

fn next_transaction_id() -> TransactionId {
    NEXT_TRANSACTION.fetch_add(1, Ordering::Relaxed)
}

/// Why a rename could not be resolved or committed.
#[derive(Debug, Error)]
pub enum RenameError {
    #[error("'{0}' is not a legal identifier")]
    InvalidName(String),

    #[error("no symbol is bound to the identifier at {0}")]
    UnresolvedSymbol(SymbolLocation),

    #[error("'{name}' already binds to a different symbol at {location}")]
    NameCollision {
        name: String,
        location: SymbolLocation,
    },

    #[error("rename target is not an identifier token")]
    NotAnIdentifier,

    #[error("file {0} is locked by another transaction")]
    FileLocked(PathBuf),

    #[error("no tree provided for {0}")]
    MissingTree(PathBuf),

    #[error("renamed file no longer parses: {0}")]
    Reparse(#[from] ParseError),

    #[error("inconsistent occurrence set: {0}")]
    Edit(#[from] EditError),
}

/// The full edit set of one rename, sharing one transaction id.
///
/// Holds its files locked for its whole lifetime; dropping the
/// transaction aborts it and releases the locks.
#[derive(Debug)]
pub struct RenameTransaction {
    pub id: TransactionId,
    pub symbol: SymbolId,
    pub old_name: String,
    pub new_name: String,
    /// One edit per occurrence, sorted by file then start offset
    pub edits: Vec<Edit>,
    guard: LockGuard,
}

impl RenameTransaction {
    /// Distinct files touched by this transaction.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.edits.iter().map(|e| e.file.clone()).collect();
        files.sort();
        files.dedup();
        files
    }

    pub fn occurrence_count(&self) -> usize {
        self.edits.len()
    }
}

/// Resolves rename requests against the host's symbol services.
pub struct RenameResolver<'a> {
    host: &'a dyn Host,
    locks: FileLocks,
}

impl<'a> RenameResolver<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self {
            host,
            locks: FileLocks::new(),
        }
    }

    /// Share a lock table with a batch fix engine so renames and fix
    /// passes over the same file never interleave.
    pub fn with_locks(mut self, locks: FileLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Resolve a rename of the identifier at `token` in `file` to
    /// `new_name`. `trees` is the current compilation snapshot; every
    /// occurrence's edit is stamped with its file's tree version.
    ///
    /// Collisions with existing bindings are errors unless
    /// `override_collisions` is set. On success the returned transaction
    /// holds locks over its whole file set; call
    /// [`commit`](Self::commit) to apply it or drop it to abort.
    pub fn rename(
        &self,
        trees: &[SourceTree],
        file: &Path,
        token: NodeId,
        new_name: &str,
        scope: &Scope,
        override_collisions: bool,
    ) -> Result<RenameTransaction, RenameError> {
        let Some(tree) = trees.iter().find(|t| t.path() == file) else {
            return Err(RenameError::MissingTree(file.to_path_buf()));
        };
        if !self.host.is_valid_identifier(new_name) {
            return Err(RenameError::InvalidName(new_name.to_string()));
        }
        if !tree.is_token(token) {
            return Err(RenameError::NotAnIdentifier);
        }

        let token_location = SymbolLocation::new(tree.path(), tree.span(token));
        let symbol = self
            .host
            .resolve_symbol(tree, token)
            .ok_or_else(|| RenameError::UnresolvedSymbol(token_location.clone()))?;

        // The host's answer is the complete occurrence set; an empty set
        // for a resolved symbol means resolution is unsound, so refuse.
        let occurrences = self.host.find_references(symbol, scope);
        if occurrences.is_empty() {
            return Err(RenameError::UnresolvedSymbol(token_location));
        }

        if !override_collisions {
            for occurrence in &occurrences {
                if let Some(other) = self.host.lookup_name(new_name, occurrence) {
                    if other != symbol {
                        return Err(RenameError::NameCollision {
                            name: new_name.to_string(),
                            location: occurrence.clone(),
                        });
                    }
                }
            }
        }

        let versions: HashMap<&Path, u32> =
            trees.iter().map(|t| (t.path(), t.version())).collect();

        let id = next_transaction_id();
        let old_name = tree.node_text(token).to_string();
        let mut edits: Vec<Edit> = Vec::with_capacity(occurrences.len());
        for occ in occurrences {
            let Some(&version) = versions.get(occ.file.as_path()) else {
                return Err(RenameError::MissingTree(occ.file));
            };
            edits.push(Edit {
                file: occ.file,
                span: occ.span,
                replacement: new_name.to_string(),
                rule_id: RENAME_RULE.to_string(),
                seq: 0,
                tree_version: version,
                transaction: Some(id),
            });
        }
        edits.sort_by(|a, b| a.file.cmp(&b.file).then(a.span.start.cmp(&b.span.start)));

        // The lock set lives in the transaction until commit or abort.
        let mut files: Vec<PathBuf> = edits.iter().map(|e| e.file.clone()).collect();
        files.sort();
        files.dedup();
        let Some(guard) = self.locks.try_lock_all(&files) else {
            let locked = files
                .iter()
                .find(|f| self.locks.is_locked(f))
                .cloned()
                .unwrap_or_default();
            return Err(RenameError::FileLocked(locked));
        };

        let transaction = RenameTransaction {
            id,
            symbol,
            old_name,
            new_name: new_name.to_string(),
            edits,
            guard,
        };
        debug!(
            "rename '{}' -> '{}': {} occurrence(s) in {} file(s)",
            transaction.old_name,
            transaction.new_name,
            transaction.occurrence_count(),
            transaction.files().len()
        );
        Ok(transaction)
    }

    /// Apply a transaction to the given trees, all-or-nothing.
    ///
    /// Every rewritten file is version checked and reparsed before any
    /// tree is replaced. On any failure the input trees are returned
    /// unchanged. Consumes the transaction either way, releasing its
    /// file locks.
    pub fn commit(
        &self,
        transaction: RenameTransaction,
        trees: Vec<SourceTree>,
    ) -> Result<Vec<SourceTree>, (Vec<SourceTree>, RenameError)> {
        // Stage every rewrite before touching anything.
        let staged = match self.stage(&transaction, &trees) {
            Ok(staged) => staged,
            Err(e) => return Err((trees, e)),
        };

        let mut trees = trees;
        for (index, new_tree) in staged {
            trees[index] = new_tree;
        }
        info!(
            "rename '{}' -> '{}' committed ({} edits)",
            transaction.old_name,
            transaction.new_name,
            transaction.occurrence_count()
        );
        Ok(trees)
    }

    /// Compute and reparse every rewritten file without mutating anything.
    /// Every edited file must be present at the version its edits were
    /// computed against.
    fn stage(
        &self,
        transaction: &RenameTransaction,
        trees: &[SourceTree],
    ) -> Result<Vec<(usize, SourceTree)>, RenameError> {
        let mut by_file: HashMap<PathBuf, Vec<Edit>> = HashMap::new();
        for edit in &transaction.edits {
            by_file
                .entry(edit.file.clone())
                .or_default()
                .push(edit.clone());
        }

        let mut staged = Vec::new();
        for (file, edits) in &by_file {
            let Some((index, tree)) = trees
                .iter()
                .enumerate()
                .find(|(_, t)| t.path() == file.as_path())
            else {
                return Err(RenameError::MissingTree(file.clone()));
            };
            for edit in edits {
                if edit.tree_version != tree.version() {
                    return Err(EditError::StaleVersion {
                        edit: edit.tree_version,
                        tree: tree.version(),
                    }
                    .into());
                }
            }
            let new_text = apply_edits(tree.text(), edits)?;
            let new_tree = self.host.parse(tree.path(), &new_text, tree.version() + 1)?;
            staged.push((index, new_tree));
        }
        Ok(staged)
    }
}
