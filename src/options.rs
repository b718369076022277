//! Resolved analysis options
//!
//! The hierarchical settings loader is an external collaborator; by the
//! time options reach this crate they are a single fully-resolved, typed
//! value. Nothing here reads files.

use crate::diagnostic::Severity;
use crate::rule::RuleDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Walk trees in parallel
    pub parallel: bool,

    /// Number of worker threads (0 = auto-detect)
    pub jobs: usize,

    /// Override for the batch fix pass budget (default: initial
    /// fixable-diagnostic count)
    pub max_passes: Option<usize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
            max_passes: None,
        }
    }
}

/// Rule enablement and severity overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleOptions {
    /// Explicitly disabled rule ids
    pub disabled: Vec<String>,

    /// Explicitly enabled rule ids (overrides `enabled_by_default = false`)
    pub enabled: Vec<String>,

    /// Per-rule severity overrides
    pub severity: HashMap<String, Severity>,
}

impl RuleOptions {
    /// Whether a rule runs, combining its descriptor default with the
    /// explicit enable/disable lists. Disable wins over enable.
    pub fn is_rule_enabled(&self, descriptor: &RuleDescriptor) -> bool {
        if self.disabled.iter().any(|id| id == &descriptor.id) {
            return false;
        }
        if self.enabled.iter().any(|id| id == &descriptor.id) {
            return true;
        }
        descriptor.enabled_by_default
    }

    pub fn severity_override(&self, rule_id: &str) -> Option<Severity> {
        self.severity.get(rule_id).copied()
    }
}

/// Identifier naming convention enforced by the built-in naming rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStyle {
    #[default]
    Snake,
    Camel,
    Pascal,
}

/// Naming convention settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingOptions {
    pub identifier_style: NamingStyle,
}

/// Formatting parameters read by formatting rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    /// Spaces per indent level
    pub indent_width: usize,

    /// Maximum allowed line length
    pub max_line_length: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent_width: 4,
            max_line_length: 120,
        }
    }
}

/// The complete resolved options value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub engine: EngineOptions,
    pub rules: RuleOptions,
    pub naming: NamingOptions,
    pub format: FormatOptions,
}
