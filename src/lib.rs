//! Restyle - Style Rule Analysis and Auto-Correction Engine
//!
//! A rule-evaluation engine for syntax trees with batch auto-correction
//! and cross-file rename support. The language being analyzed is supplied
//! by a [`Host`] implementation; the engine itself only sees trees, node
//! kinds and spans.
//!
//! # Architecture
//!
//! ```text
//! Host -> SourceTree -> AnalysisEngine -> TreeWalker -> Diagnostics
//!                            |                              |
//!                            v                              v
//!                      verdict barrier              BatchFixEngine
//! ```
//!
//! Trees are walked in parallel; stateless analyzers report per-node
//! diagnostics, aggregating rules return per-tree verdicts that a single
//! barrier reduces into at most one compilation-wide diagnostic each. The
//! batch engine composes one conflict-free rewrite per file per pass and
//! iterates to a fixed point under a pass budget. The rename resolver
//! commits multi-file identifier renames atomically, sharing a file lock
//! table with the batch engine.

pub mod batch;
pub mod cancel;
pub mod diagnostic;
pub mod engine;
pub mod fix;
pub mod host;
pub mod locks;
pub mod options;
pub mod registry;
pub mod rename;
pub mod rule;
pub mod rules;
pub mod span;
pub mod tree;
pub mod walker;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use batch::{BatchFixEngine, BatchOutcome, BatchSession};
pub use cancel::CancelToken;
pub use diagnostic::{Diagnostic, Severity};
pub use engine::{AnalysisEngine, AnalysisResult};
pub use fix::{apply_edits, Edit, EditError, FixProvider, TransactionId};
pub use host::{Host, ParseError, Scope, SymbolId, SymbolLocation};
pub use locks::{FileLocks, LockGuard};
pub use options::{EngineOptions, FormatOptions, NamingOptions, NamingStyle, Options, RuleOptions};
pub use registry::{RegistryError, RuleEntry, RuleRegistry};
pub use rename::{RenameError, RenameResolver, RenameTransaction};
pub use rule::{AggregatingRule, RuleAnalyzer, RuleCategory, RuleDescriptor, RuleError, TreeVerdict};
pub use span::{LineIndex, Span};
pub use tree::{NodeId, SourceTree, TreeBuilder};
pub use walker::{TreeWalker, WalkOutput};
