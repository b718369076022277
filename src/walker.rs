//! Tree walk and rule dispatch
//!
//! One walk visits every node of one tree exactly once, in source order,
//! invoking every enabled analyzer subscribed to the node's kind. The walk
//! is read-only. A failing rule is reported once as an internal-error
//! diagnostic naming the rule id and skipped for the rest of the walk;
//! other rules are unaffected.

use crate::cancel::CancelToken;
use crate::diagnostic::Diagnostic;
use crate::options::Options;
use crate::registry::{Analyzer, RuleRegistry};
use crate::rule::TreeVerdict;
use crate::tree::SourceTree;
use log::warn;
use std::collections::{HashMap, HashSet};

/// Everything one walk produced: position-ordered diagnostics plus the
/// settled per-tree verdict of every enabled aggregating rule.
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub verdicts: HashMap<String, TreeVerdict>,
}

/// Dispatches node-visit events to registered analyzers.
pub struct TreeWalker<'a> {
    registry: &'a RuleRegistry,
    options: &'a Options,
    cancel: CancelToken,
}

impl<'a> TreeWalker<'a> {
    pub fn new(registry: &'a RuleRegistry, options: &'a Options, cancel: CancelToken) -> Self {
        Self {
            registry,
            options,
            cancel,
        }
    }

    /// Walk one tree. Effective severity is the configured override or the
    /// descriptor default; rule-set severities are not trusted.
    pub fn walk(&self, tree: &SourceTree) -> WalkOutput {
        let mut output = WalkOutput::default();

        // Dispatch table over enabled rules: kind -> registration indices,
        // plus the catch-all subscribers. Built once per walk.
        let entries: Vec<_> = self.registry.iter().collect();
        let mut by_kind: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut catch_all: Vec<usize> = Vec::new();

        for (idx, entry) in entries.iter().enumerate() {
            if !self.options.rules.is_rule_enabled(&entry.descriptor) {
                continue;
            }
            let kinds = match &entry.analyzer {
                Analyzer::Stateless(a) => a.kinds(),
                Analyzer::Aggregating(r) => r.kinds(),
            };
            if kinds.is_empty() {
                catch_all.push(idx);
            } else {
                for kind in kinds {
                    by_kind.entry(kind).or_default().push(idx);
                }
            }
            if matches!(entry.analyzer, Analyzer::Aggregating(_)) {
                output
                    .verdicts
                    .insert(entry.descriptor.id.clone(), TreeVerdict::Unknown);
            }
        }

        let mut failed: HashSet<usize> = HashSet::new();

        'nodes: for node in tree.preorder() {
            // Cancellation is polled at node-visit granularity
            if self.cancel.is_cancelled() {
                break 'nodes;
            }

            let kind = tree.kind(node);
            let subscribers = merge_subscribers(&catch_all, by_kind.get(kind));

            for idx in subscribers {
                if failed.contains(&idx) {
                    continue;
                }
                let entry = entries[idx];
                let rule_id = &entry.descriptor.id;
                let severity = self
                    .options
                    .rules
                    .severity_override(rule_id)
                    .unwrap_or(entry.descriptor.default_severity);

                match &entry.analyzer {
                    Analyzer::Stateless(analyzer) => {
                        match analyzer.check(tree, node, self.options) {
                            Ok(diags) => {
                                for mut diag in diags {
                                    diag.severity = severity;
                                    output.diagnostics.push(diag);
                                }
                            }
                            Err(e) => {
                                warn!("rule '{}' failed on {}: {}", rule_id, tree.path().display(), e);
                                output
                                    .diagnostics
                                    .push(Diagnostic::internal_rule_error(rule_id, &e.to_string(), tree));
                                failed.insert(idx);
                            }
                        }
                    }
                    Analyzer::Aggregating(rule) => {
                        let verdict = output
                            .verdicts
                            .get_mut(rule_id.as_str())
                            .unwrap_or_else(|| unreachable!());
                        if verdict.is_triggered() {
                            continue;
                        }
                        match rule.triggers(tree, node, self.options) {
                            Ok(true) => verdict.trigger(),
                            Ok(false) => {}
                            Err(e) => {
                                warn!("rule '{}' failed on {}: {}", rule_id, tree.path().display(), e);
                                output
                                    .diagnostics
                                    .push(Diagnostic::internal_rule_error(rule_id, &e.to_string(), tree));
                                failed.insert(idx);
                            }
                        }
                    }
                }
            }
        }

        for verdict in output.verdicts.values_mut() {
            verdict.settle();
        }

        // Source-position order; no-location diagnostics sort last. Stable,
        // so same-offset diagnostics keep rule registration order.
        output.diagnostics.sort_by_key(|d| d.span.start);
        output
    }
}

/// Merge catch-all and kind-specific subscriber lists preserving
/// registration order. Both inputs are already sorted.
fn merge_subscribers(catch_all: &[usize], specific: Option<&Vec<usize>>) -> Vec<usize> {
    let specific = specific.map(|v| v.as_slice()).unwrap_or(&[]);
    let mut merged = Vec::with_capacity(catch_all.len() + specific.len());
    let (mut i, mut j) = (0, 0);
    while i < catch_all.len() && j < specific.len() {
        if catch_all[i] < specific[j] {
            merged.push(catch_all[i]);
            i += 1;
        } else {
            merged.push(specific[j]);
            j += 1;
        }
    }
    merged.extend_from_slice(&catch_all[i..]);
    merged.extend_from_slice(&specific[j..]);
    merged
}
