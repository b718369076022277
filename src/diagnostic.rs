//! Diagnostic types for analysis results

use crate::span::Span;
use crate::tree::SourceTree;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Severity level for diagnostics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Not shown to the user; still produced for tooling
    Hidden,
    /// Informational message
    Info,
    /// Warning - potential issue
    #[default]
    Warning,
    /// Error - definite problem
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Hidden => write!(f, "hidden"),
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hidden" | "none" => Ok(Severity::Hidden),
            "info" | "hint" | "note" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Rule id attached to internal-error diagnostics produced when an
/// analyzer or fix provider fails.
pub const INTERNAL_ERROR_RULE: &str = "internal-rule-error";

/// Rule id attached to file-level parse failures.
pub const PARSE_ERROR_RULE: &str = "parse-error";

/// A located, categorized violation report. Immutable once created; always
/// bound to the tree version it was produced against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Rule ID that produced this diagnostic
    pub rule_id: String,
    /// Severity level
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Source file
    pub file: PathBuf,
    /// Primary span, or [`Span::NONE`] for compilation-level verdicts
    pub span: Span,
    /// Line number (1-based, 0 when no location)
    pub line: usize,
    /// Column number (1-based, 0 when no location)
    pub column: usize,
    /// Secondary spans (e.g. the other half of an ordering violation)
    #[serde(default)]
    pub additional_spans: Vec<Span>,
    /// Version of the tree the spans were computed against
    pub tree_version: u32,
}

impl Diagnostic {
    /// Diagnostic at a span inside `tree`; line/column are derived here.
    pub fn new(
        rule_id: &str,
        severity: Severity,
        message: &str,
        tree: &SourceTree,
        span: Span,
    ) -> Self {
        let (line, column) = if span.is_none() {
            (0, 0)
        } else {
            tree.line_col(span.start)
        };
        Self {
            rule_id: rule_id.to_string(),
            severity,
            message: message.to_string(),
            file: tree.path().to_path_buf(),
            span,
            line,
            column,
            additional_spans: Vec::new(),
            tree_version: tree.version(),
        }
    }

    /// File-level diagnostic with no usable span (read failures, parse
    /// failures).
    pub fn file_level(
        rule_id: &str,
        severity: Severity,
        message: &str,
        file: &Path,
        line: usize,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            message: message.to_string(),
            file: file.to_path_buf(),
            span: Span::NONE,
            line,
            column: 0,
            additional_spans: Vec::new(),
            tree_version: 0,
        }
    }

    /// Compilation-level diagnostic at the no-location sentinel.
    pub fn no_location(rule_id: &str, severity: Severity, message: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            message: message.to_string(),
            file: PathBuf::new(),
            span: Span::NONE,
            line: 0,
            column: 0,
            additional_spans: Vec::new(),
            tree_version: 0,
        }
    }

    /// Internal-error diagnostic naming the rule whose evaluation failed.
    pub fn internal_rule_error(failing_rule: &str, error: &str, tree: &SourceTree) -> Self {
        Self::file_level(
            INTERNAL_ERROR_RULE,
            Severity::Error,
            &format!("rule '{}' failed: {}", failing_rule, error),
            tree.path(),
            0,
        )
    }

    pub fn with_additional_span(mut self, span: Span) -> Self {
        self.additional_spans.push(span);
        self
    }

    pub fn has_location(&self) -> bool {
        !self.span.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}
