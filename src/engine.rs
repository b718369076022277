//! Compilation-wide analysis engine
//!
//! Trees are walked in parallel, one worker per tree, with no shared
//! mutable state: each walk returns its diagnostics and per-tree verdict
//! partials as pure values. After the parallel section completes (the
//! compilation-end barrier) the partials are reduced with the associative,
//! order-independent [`TreeVerdict::combine`] and each triggered
//! aggregating rule emits at most one diagnostic at the no-location
//! sentinel.

use crate::cancel::CancelToken;
use crate::diagnostic::{Diagnostic, Severity, PARSE_ERROR_RULE};
use crate::host::Host;
use crate::options::Options;
use crate::registry::RuleRegistry;
use crate::rule::TreeVerdict;
use crate::tree::SourceTree;
use crate::walker::TreeWalker;
use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Result of one analysis run over a set of trees.
#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// All diagnostics, per-tree ones in source order
    pub diagnostics: Vec<Diagnostic>,

    /// Trees analyzed
    pub trees_analyzed: usize,

    /// Total errors
    pub error_count: usize,

    /// Total warnings
    pub warning_count: usize,

    /// Total info messages
    pub info_count: usize,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Whether the run was cut short by cancellation
    pub cancelled: bool,
}

impl AnalysisResult {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && self.warning_count == 0
    }

    /// Merge another result into this one.
    pub fn merge(&mut self, other: AnalysisResult) {
        self.diagnostics.extend(other.diagnostics);
        self.trees_analyzed += other.trees_analyzed;
        self.error_count += other.error_count;
        self.warning_count += other.warning_count;
        self.info_count += other.info_count;
        self.cancelled |= other.cancelled;
    }

    fn push(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Info => self.info_count += 1,
            Severity::Hidden => {}
        }
        self.diagnostics.push(diag);
    }
}

/// Runs the full rule set over a compilation's trees.
pub struct AnalysisEngine<'a> {
    registry: &'a RuleRegistry,
    options: &'a Options,
}

impl<'a> AnalysisEngine<'a> {
    pub fn new(registry: &'a RuleRegistry, options: &'a Options) -> Self {
        Self { registry, options }
    }

    /// Analyze a set of already-parsed trees.
    pub fn analyze(&self, trees: &[SourceTree], cancel: &CancelToken) -> AnalysisResult {
        let start = Instant::now();
        let mut result = AnalysisResult {
            trees_analyzed: trees.len(),
            ..AnalysisResult::default()
        };

        let outputs: Vec<_> = if self.options.engine.parallel {
            let jobs = if self.options.engine.jobs > 0 {
                self.options.engine.jobs
            } else {
                num_cpus::get()
            };
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .unwrap_or_else(|_| rayon::ThreadPoolBuilder::new().build().unwrap());

            pool.install(|| {
                trees
                    .par_iter()
                    .map(|tree| TreeWalker::new(self.registry, self.options, cancel.clone()).walk(tree))
                    .collect()
            })
        } else {
            trees
                .iter()
                .map(|tree| TreeWalker::new(self.registry, self.options, cancel.clone()).walk(tree))
                .collect()
        };

        // Barrier: every walk has completed. Reduce the per-tree partials.
        let mut combined: HashMap<String, TreeVerdict> = HashMap::new();
        for output in outputs {
            for diag in output.diagnostics {
                result.push(diag);
            }
            for (rule_id, verdict) in output.verdicts {
                let entry = combined.entry(rule_id).or_default();
                *entry = entry.combine(verdict);
            }
        }

        if cancel.is_cancelled() {
            result.cancelled = true;
            result.duration = start.elapsed();
            return result;
        }

        // At most one compilation-level diagnostic per aggregating rule.
        let mut rule_ids: Vec<_> = combined
            .iter()
            .filter(|(_, v)| v.is_triggered())
            .map(|(id, _)| id.clone())
            .collect();
        rule_ids.sort();
        for rule_id in rule_ids {
            if let Some(entry) = self.registry.get(&rule_id) {
                if let crate::registry::Analyzer::Aggregating(rule) = &entry.analyzer {
                    let severity = self
                        .options
                        .rules
                        .severity_override(&rule_id)
                        .unwrap_or(entry.descriptor.default_severity);
                    result.push(Diagnostic::no_location(
                        &rule_id,
                        severity,
                        &rule.verdict_message(),
                    ));
                }
            }
        }

        result.duration = start.elapsed();
        debug!(
            "analyzed {} trees in {:?}: {} errors, {} warnings",
            result.trees_analyzed, result.duration, result.error_count, result.warning_count
        );
        result
    }

    /// Parse and analyze raw sources. A file that fails to parse is
    /// skipped for this run and reported with a single parse diagnostic;
    /// other files are unaffected.
    pub fn analyze_sources(
        &self,
        host: &dyn Host,
        sources: &[(PathBuf, String)],
        cancel: &CancelToken,
    ) -> (Vec<SourceTree>, AnalysisResult) {
        let mut trees = Vec::with_capacity(sources.len());
        let mut parse_failures = Vec::new();

        for (path, text) in sources {
            match host.parse(path, text, 1) {
                Ok(tree) => trees.push(tree),
                Err(e) => {
                    debug!("skipping {}: {}", path.display(), e);
                    parse_failures.push(Diagnostic::file_level(
                        PARSE_ERROR_RULE,
                        Severity::Error,
                        &e.to_string(),
                        path,
                        e.line(),
                    ));
                }
            }
        }

        let mut result = self.analyze(&trees, cancel);
        for diag in parse_failures {
            result.push(diag);
        }
        (trees, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RuleEntry;
    use crate::rule::{AggregatingRule, RuleCategory, RuleDescriptor, RuleError};
    use crate::span::Span;
    use crate::tree::{NodeId, TreeBuilder};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct TriggersOnDeprecated;

    impl AggregatingRule for TriggersOnDeprecated {
        fn kinds(&self) -> &[&str] {
            &["deprecated"]
        }

        fn triggers(
            &self,
            _tree: &SourceTree,
            _node: NodeId,
            _options: &Options,
        ) -> Result<bool, RuleError> {
            Ok(true)
        }

        fn verdict_message(&self) -> String {
            "compilation uses deprecated syntax".to_string()
        }
    }

    fn aggregating_registry() -> RuleRegistry {
        let mut registry = RuleRegistry::new();
        registry
            .register(RuleEntry::aggregating(
                RuleDescriptor::new("no-deprecated", RuleCategory::Maintainability),
                Arc::new(TriggersOnDeprecated),
            ))
            .unwrap();
        registry
    }

    fn plain_tree(name: &str) -> SourceTree {
        let mut b = TreeBuilder::new(name, "foo");
        b.open("document", Span::new(0, 3));
        b.token("identifier", Span::new(0, 3));
        b.close();
        b.finish()
    }

    fn deprecated_tree(name: &str) -> SourceTree {
        let mut b = TreeBuilder::new(name, "old");
        b.open("document", Span::new(0, 3));
        b.token("deprecated", Span::new(0, 3));
        b.close();
        b.finish()
    }

    #[test]
    fn test_single_compilation_diagnostic_at_sentinel() {
        // Scenario: three trees, only the second satisfies the trigger.
        let trees = vec![
            plain_tree("one.src"),
            deprecated_tree("two.src"),
            plain_tree("three.src"),
        ];
        let registry = aggregating_registry();
        let options = Options::default();
        let engine = AnalysisEngine::new(&registry, &options);

        let result = engine.analyze(&trees, &CancelToken::new());
        assert_eq!(result.diagnostics.len(), 1);
        let diag = &result.diagnostics[0];
        assert_eq!(diag.rule_id, "no-deprecated");
        assert_eq!(diag.span, Span::NONE);
        assert!(!diag.has_location());
    }

    #[test]
    fn test_aggregation_order_independent() {
        // The verdict must not depend on tree order.
        let registry = aggregating_registry();
        let options = Options::default();
        let engine = AnalysisEngine::new(&registry, &options);

        let orders: Vec<Vec<SourceTree>> = vec![
            vec![deprecated_tree("a.src"), plain_tree("b.src"), plain_tree("c.src")],
            vec![plain_tree("b.src"), deprecated_tree("a.src"), plain_tree("c.src")],
            vec![plain_tree("b.src"), plain_tree("c.src"), deprecated_tree("a.src")],
        ];
        for trees in orders {
            let result = engine.analyze(&trees, &CancelToken::new());
            assert_eq!(result.diagnostics.len(), 1);
            assert_eq!(result.diagnostics[0].rule_id, "no-deprecated");
        }
    }

    #[test]
    fn test_no_trigger_no_diagnostic() {
        let trees = vec![plain_tree("one.src"), plain_tree("two.src")];
        let registry = aggregating_registry();
        let options = Options::default();
        let engine = AnalysisEngine::new(&registry, &options);

        let result = engine.analyze(&trees, &CancelToken::new());
        assert!(result.diagnostics.is_empty());
        assert!(result.is_clean());
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let trees = vec![
            plain_tree("one.src"),
            deprecated_tree("two.src"),
            plain_tree("three.src"),
        ];
        let registry = aggregating_registry();

        let mut seq_opts = Options::default();
        seq_opts.engine.parallel = false;
        let seq = AnalysisEngine::new(&registry, &seq_opts).analyze(&trees, &CancelToken::new());

        let par_opts = Options::default();
        let par = AnalysisEngine::new(&registry, &par_opts).analyze(&trees, &CancelToken::new());

        assert_eq!(seq.diagnostics.len(), par.diagnostics.len());
        assert_eq!(seq.error_count, par.error_count);
        assert_eq!(seq.warning_count, par.warning_count);
    }

    #[test]
    fn test_cancelled_run_suppresses_verdicts() {
        let trees = vec![deprecated_tree("a.src")];
        let registry = aggregating_registry();
        let options = Options::default();
        let engine = AnalysisEngine::new(&registry, &options);

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = engine.analyze(&trees, &cancel);
        assert!(result.cancelled);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_parse_failure_contained_per_file() {
        // One malformed source among good ones: exactly one parse-error
        // diagnostic, the good files analyzed as usual.
        let registry = RuleRegistry::builtin();
        let options = Options::default();
        let engine = AnalysisEngine::new(&registry, &options);
        let host = crate::testing::MockHost::new();

        let sources = vec![
            (PathBuf::from("a.src"), "BadName".to_string()),
            (PathBuf::from("broken.src"), "x <<< y".to_string()),
            (PathBuf::from("c.src"), "AlsoBad".to_string()),
        ];
        let (trees, result) = engine.analyze_sources(&host, &sources, &CancelToken::new());
        assert_eq!(trees.len(), 2);

        let parse_errors: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.rule_id == PARSE_ERROR_RULE)
            .collect();
        assert_eq!(parse_errors.len(), 1);
        assert_eq!(parse_errors[0].file, PathBuf::from("broken.src"));
        assert!(!parse_errors[0].has_location());

        let naming: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.rule_id == "identifier-naming")
            .collect();
        assert_eq!(naming.len(), 2);
        assert!(result.has_errors());
    }

    #[test]
    fn test_result_merge() {
        let mut a = AnalysisResult {
            trees_analyzed: 1,
            error_count: 2,
            ..AnalysisResult::default()
        };
        let b = AnalysisResult {
            trees_analyzed: 1,
            warning_count: 3,
            ..AnalysisResult::default()
        };
        a.merge(b);
        assert_eq!(a.trees_analyzed, 2);
        assert_eq!(a.error_count, 2);
        assert_eq!(a.warning_count, 3);
    }
}
