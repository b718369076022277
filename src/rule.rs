//! Rule descriptors and analyzer contracts
//!
//! Two analyzer shapes exist. A [`RuleAnalyzer`] is a pure per-node check
//! with no memory across calls. An [`AggregatingRule`] accumulates one
//! [`TreeVerdict`] per tree during the walk; the verdicts are reduced at a
//! compilation-end barrier into at most one whole-compilation diagnostic.

use crate::diagnostic::{Diagnostic, Severity};
use crate::options::Options;
use crate::tree::{NodeId, SourceTree};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Rule category for grouping related rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    /// Spacing around tokens
    Spacing,
    /// Readability of expressions and statements
    #[default]
    Readability,
    /// Member and declaration ordering
    Ordering,
    /// Identifier naming conventions
    Naming,
    /// Long-term maintainability concerns
    Maintainability,
    /// File and block layout
    Layout,
    /// Documentation comments
    Documentation,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Spacing => write!(f, "spacing"),
            RuleCategory::Readability => write!(f, "readability"),
            RuleCategory::Ordering => write!(f, "ordering"),
            RuleCategory::Naming => write!(f, "naming"),
            RuleCategory::Maintainability => write!(f, "maintainability"),
            RuleCategory::Layout => write!(f, "layout"),
            RuleCategory::Documentation => write!(f, "documentation"),
        }
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spacing" => Ok(RuleCategory::Spacing),
            "readability" => Ok(RuleCategory::Readability),
            "ordering" => Ok(RuleCategory::Ordering),
            "naming" => Ok(RuleCategory::Naming),
            "maintainability" => Ok(RuleCategory::Maintainability),
            "layout" => Ok(RuleCategory::Layout),
            "documentation" | "docs" => Ok(RuleCategory::Documentation),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Process-wide, read-only description of one rule. Owned by the registry
/// after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDescriptor {
    /// Stable, globally unique rule id
    pub id: String,

    /// Category for grouping and filtering
    pub category: RuleCategory,

    /// Severity used when no override is configured
    pub default_severity: Severity,

    /// Whether the rule runs without explicit enablement
    pub enabled_by_default: bool,

    /// Documentation reference
    pub help_url: Option<String>,
}

impl RuleDescriptor {
    pub fn new(id: &str, category: RuleCategory) -> Self {
        Self {
            id: id.to_string(),
            category,
            default_severity: Severity::Warning,
            enabled_by_default: true,
            help_url: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.default_severity = severity;
        self
    }

    /// Rule runs only when explicitly enabled.
    pub fn opt_in(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }

    pub fn with_help_url(mut self, url: &str) -> Self {
        self.help_url = Some(url.to_string());
        self
    }
}

/// Error raised by a rule body. Contained at the dispatch boundary and
/// converted into an internal-error diagnostic naming the rule.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("{0}")]
    Failed(String),
}

impl RuleError {
    pub fn failed(message: impl Into<String>) -> Self {
        RuleError::Failed(message.into())
    }
}

/// A stateless, pure per-node check.
pub trait RuleAnalyzer: Send + Sync {
    /// Node kinds this analyzer subscribes to; empty means every node.
    fn kinds(&self) -> &[&str] {
        &[]
    }

    /// Check one node. The tree is read-only; returned diagnostics must be
    /// created against `tree`.
    fn check(
        &self,
        tree: &SourceTree,
        node: NodeId,
        options: &Options,
    ) -> Result<Vec<Diagnostic>, RuleError>;
}

/// A stateful-aggregating rule: a per-node trigger predicate whose
/// per-tree result is sticky, plus the compilation-level message emitted
/// when any tree triggered.
pub trait AggregatingRule: Send + Sync {
    /// Node kinds the trigger predicate is consulted for; empty means
    /// every node.
    fn kinds(&self) -> &[&str] {
        &[]
    }

    /// Whether this node satisfies the trigger predicate.
    fn triggers(
        &self,
        tree: &SourceTree,
        node: NodeId,
        options: &Options,
    ) -> Result<bool, RuleError>;

    /// Message of the single compilation-wide diagnostic.
    fn verdict_message(&self) -> String;
}

/// Per-tree partial result of an aggregating rule.
///
/// Writes are monotonic: `Unknown -> Triggered` is the only transition
/// during a walk (set-once, never reverted), and `Unknown` settles to
/// `NotTriggered` when the walk ends without a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TreeVerdict {
    #[default]
    Unknown,
    Triggered,
    NotTriggered,
}

impl TreeVerdict {
    /// Sticky trigger: only moves `Unknown -> Triggered`.
    pub fn trigger(&mut self) {
        if *self == TreeVerdict::Unknown {
            *self = TreeVerdict::Triggered;
        }
    }

    /// End-of-walk settlement: `Unknown` becomes `NotTriggered`.
    pub fn settle(&mut self) {
        if *self == TreeVerdict::Unknown {
            *self = TreeVerdict::NotTriggered;
        }
    }

    /// Associative, commutative reduction: triggered if either side is.
    pub fn combine(self, other: TreeVerdict) -> TreeVerdict {
        use TreeVerdict::*;
        match (self, other) {
            (Triggered, _) | (_, Triggered) => Triggered,
            (NotTriggered, _) | (_, NotTriggered) => NotTriggered,
            (Unknown, Unknown) => Unknown,
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self == TreeVerdict::Triggered
    }
}
