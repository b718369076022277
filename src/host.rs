//! Services supplied by the embedding host
//!
//! The host owns parsing and symbol resolution; this crate consumes both
//! through the [`Host`] trait. The batch fix engine uses [`Host::parse`] to
//! obtain the next tree version after a composite rewrite, and the rename
//! resolver relies on [`Host::find_references`] being exhaustive.

use crate::span::Span;
use crate::tree::{NodeId, SourceTree};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error from the host's parser.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed input in {file} at line {line}: {message}")]
    Malformed {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Line the parser gave up at, for file-level diagnostics.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Malformed { line, .. } => *line,
            ParseError::Io(_) => 0,
        }
    }
}

/// Opaque identity of a resolved symbol, assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u64);

/// How far an analysis or fix run reaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// A single file
    File(PathBuf),
    /// Every file of the current project
    Project,
    /// Every file of every project in the solution
    Solution,
}

impl Scope {
    pub fn includes(&self, path: &Path) -> bool {
        match self {
            Scope::File(f) => f == path,
            Scope::Project | Scope::Solution => true,
        }
    }
}

/// A syntactic occurrence of a symbol: declaration or reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub file: PathBuf,
    pub span: Span,
}

impl SymbolLocation {
    pub fn new(file: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            file: file.into(),
            span,
        }
    }
}

impl fmt::Display for SymbolLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}..{}",
            self.file.display(),
            self.span.start,
            self.span.end
        )
    }
}

/// The compilation host.
///
/// All methods are read-only with respect to trees already handed out;
/// `parse` produces a fresh tree at the version the caller names.
pub trait Host: Send + Sync {
    /// Parse `text` into a tree at `version`.
    fn parse(&self, path: &Path, text: &str, version: u32) -> Result<SourceTree, ParseError>;

    /// The symbol bound to an identifier token, if any.
    fn resolve_symbol(&self, tree: &SourceTree, token: NodeId) -> Option<SymbolId>;

    /// Every declaration and reference location bound to `symbol` within
    /// `scope`. The rename resolver treats this set as exhaustive.
    fn find_references(&self, symbol: SymbolId, scope: &Scope) -> Vec<SymbolLocation>;

    /// The symbol `name` would bind to in the scopes reachable from
    /// `location`, if any. Used for rename collision detection.
    fn lookup_name(&self, name: &str, location: &SymbolLocation) -> Option<SymbolId>;

    /// Whether `name` is a legal identifier under the host grammar.
    fn is_valid_identifier(&self, name: &str) -> bool {
        default_identifier_check(name)
    }
}

/// Fallback identifier grammar: ASCII letter or underscore, then letters,
/// digits and underscores.
pub fn default_identifier_check(name: &str) -> bool {
    let ident_re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    ident_re.is_match(name)
}
