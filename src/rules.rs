//! Built-in rules
//!
//! The stock rule set registered by [`RuleRegistry::builtin`]. Each rule
//! here is small on purpose; the interesting machinery lives in the walker
//! and the fix engine.

use crate::diagnostic::{Diagnostic, Severity};
use crate::fix::{Edit, FixProvider};
use crate::options::{NamingStyle, Options};
use crate::registry::{RegistryError, RuleEntry, RuleRegistry};
use crate::rule::{AggregatingRule, RuleAnalyzer, RuleCategory, RuleDescriptor, RuleError};
use crate::span::Span;
use crate::tree::{NodeId, SourceTree};
use std::sync::Arc;

/// Register every built-in rule. Registration order is stable and fixes
/// the tie-break order for same-offset edits.
pub fn register_builtin(registry: &mut RuleRegistry) -> Result<(), RegistryError> {
    registry.register(
        RuleEntry::stateless(
            RuleDescriptor::new("identifier-naming", RuleCategory::Naming),
            Arc::new(IdentifierNaming),
        )
        .with_fix(Arc::new(IdentifierNamingFix)),
    )?;
    registry.register(RuleEntry::stateless(
        RuleDescriptor::new("no-fixme-comment", RuleCategory::Maintainability)
            .with_severity(Severity::Info),
        Arc::new(NoFixmeComment),
    ))?;
    registry.register(RuleEntry::stateless(
        RuleDescriptor::new("max-line-length", RuleCategory::Layout),
        Arc::new(MaxLineLength),
    ))?;
    registry.register(RuleEntry::aggregating(
        RuleDescriptor::new("no-deprecated-syntax", RuleCategory::Maintainability),
        Arc::new(NoDeprecatedSyntax),
    ))?;
    Ok(())
}

/// Identifier tokens must follow the configured naming style.
struct IdentifierNaming;

impl RuleAnalyzer for IdentifierNaming {
    fn kinds(&self) -> &[&str] {
        &["identifier"]
    }

    fn check(
        &self,
        tree: &SourceTree,
        node: NodeId,
        options: &Options,
    ) -> Result<Vec<Diagnostic>, RuleError> {
        let name = tree.node_text(node);
        let style = options.naming.identifier_style;
        if matches_style(name, style) {
            return Ok(Vec::new());
        }
        Ok(vec![Diagnostic::new(
            "identifier-naming",
            Severity::Warning,
            &format!("identifier '{}' should be {}", name, style_name(style)),
            tree,
            tree.span(node),
        )])
    }
}

struct IdentifierNamingFix;

impl FixProvider for IdentifierNamingFix {
    fn compute_fix(
        &self,
        tree: &SourceTree,
        diagnostic: &Diagnostic,
        options: &Options,
    ) -> Result<Option<Edit>, RuleError> {
        let Some(name) = diagnostic.span.slice(tree.text()) else {
            return Ok(None);
        };
        let converted = convert_style(name, options.naming.identifier_style);
        if converted == name || converted.is_empty() {
            return Ok(None);
        }
        Ok(Some(Edit::new(
            tree,
            diagnostic.span,
            converted,
            &diagnostic.rule_id,
        )))
    }
}

/// Comments must not carry FIXME or XXX markers.
struct NoFixmeComment;

impl RuleAnalyzer for NoFixmeComment {
    fn kinds(&self) -> &[&str] {
        &["comment"]
    }

    fn check(
        &self,
        tree: &SourceTree,
        node: NodeId,
        _options: &Options,
    ) -> Result<Vec<Diagnostic>, RuleError> {
        let text = tree.node_text(node);
        if text.contains("FIXME") || text.contains("XXX") {
            Ok(vec![Diagnostic::new(
                "no-fixme-comment",
                Severity::Info,
                "comment carries an unresolved FIXME marker",
                tree,
                tree.span(node),
            )])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Lines must stay within the configured maximum length. Checked once per
/// tree, keyed off the root node.
struct MaxLineLength;

impl RuleAnalyzer for MaxLineLength {
    fn check(
        &self,
        tree: &SourceTree,
        node: NodeId,
        options: &Options,
    ) -> Result<Vec<Diagnostic>, RuleError> {
        if tree.root() != Some(node) {
            return Ok(Vec::new());
        }
        let limit = options.format.max_line_length;
        let mut diagnostics = Vec::new();
        let mut offset = 0u32;
        for line in tree.text().split('\n') {
            let len = line.chars().count();
            if len > limit {
                let span = Span::new(offset, offset + line.len() as u32);
                diagnostics.push(Diagnostic::new(
                    "max-line-length",
                    Severity::Warning,
                    &format!("line is {} characters, limit is {}", len, limit),
                    tree,
                    span,
                ));
            }
            offset += line.len() as u32 + 1;
        }
        Ok(diagnostics)
    }
}

/// Compilation-wide flag raised when any tree still uses a construct
/// marked deprecated.
struct NoDeprecatedSyntax;

impl AggregatingRule for NoDeprecatedSyntax {
    fn kinds(&self) -> &[&str] {
        &["comment", "identifier"]
    }

    fn triggers(
        &self,
        tree: &SourceTree,
        node: NodeId,
        _options: &Options,
    ) -> Result<bool, RuleError> {
        Ok(tree.node_text(node).contains("deprecated"))
    }

    fn verdict_message(&self) -> String {
        "at least one file still uses deprecated constructs".to_string()
    }
}

fn style_name(style: NamingStyle) -> &'static str {
    match style {
        NamingStyle::Snake => "snake_case",
        NamingStyle::Camel => "camelCase",
        NamingStyle::Pascal => "PascalCase",
    }
}

fn matches_style(name: &str, style: NamingStyle) -> bool {
    convert_style(name, style) == name
}

/// Split an identifier into lowercase words on underscores and case
/// boundaries.
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in name.chars() {
        if ch == '_' {
            if !current.is_empty() {
                words.push(current.clone());
                current.clear();
            }
        } else if ch.is_uppercase() && !current.is_empty() {
            words.push(current.clone());
            current.clear();
            current.extend(ch.to_lowercase());
        } else {
            current.extend(ch.to_lowercase());
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn convert_style(name: &str, style: NamingStyle) -> String {
    let words = split_words(name);
    match style {
        NamingStyle::Snake => words.join("_"),
        NamingStyle::Camel => {
            let mut out = String::new();
            for (i, word) in words.iter().enumerate() {
                if i == 0 {
                    out.push_str(word);
                } else {
                    out.push_str(&capitalize(word));
                }
            }
            out
        }
        NamingStyle::Pascal => words.iter().map(|w| capitalize(w)).collect(),
    }
}
