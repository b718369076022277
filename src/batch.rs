//! Batch fix engine
//!
//! Composes candidate edits from many diagnostics into one conflict-free
//! rewrite per file and iterates toward a fixed point. Each pass computes
//! every candidate against that pass's tree snapshot, orders them by start
//! offset with registration order breaking ties, accepts greedily while
//! spans stay disjoint and defers the rest to the next pass. A pass budget
//! guards against fixes that re-introduce their own violation.

use crate::cancel::CancelToken;
use crate::diagnostic::{Diagnostic, Severity, PARSE_ERROR_RULE};
use crate::engine::AnalysisEngine;
use crate::fix::{apply_edits, sort_candidates, Edit, EditError};
use crate::host::{Host, Scope};
use crate::locks::FileLocks;
use crate::options::Options;
use crate::registry::RuleRegistry;
use crate::tree::SourceTree;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::PathBuf;

/// One pass's worth of fix state. Created per pass, consumed before the
/// pass ends.
#[derive(Debug)]
pub struct BatchSession {
    /// Scope of this run
    pub scope: Scope,
    /// Fixable diagnostics considered this pass
    pub candidates: Vec<Diagnostic>,
    /// Edits accepted for application, pairwise non-overlapping per file
    pub accepted: Vec<Edit>,
    /// Edits deferred to the next pass (overlap losers, locked files)
    pub deferred: Vec<Edit>,
    /// Diagnostics for fix providers that failed this pass
    pub failures: Vec<Diagnostic>,
}

impl BatchSession {
    fn new(scope: Scope) -> Self {
        Self {
            scope,
            candidates: Vec::new(),
            accepted: Vec::new(),
            deferred: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Result of running the batch engine to its fixed point (or budget).
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Edits applied across all passes
    pub applied_count: usize,
    /// Passes the convergence loop executed; a pass whose rewrites were
    /// all reverted still counts
    pub passes: usize,
    /// Diagnostics still present after the final pass
    pub remaining: Vec<Diagnostic>,
    /// True when the pass budget stopped a non-converging run
    pub budget_exhausted: bool,
    /// True when a cancellation discarded the in-flight pass
    pub cancelled: bool,
}

/// Applies fixes for a whole scope, pass by pass, until nothing more can
/// be fixed.
pub struct BatchFixEngine<'a> {
    host: &'a dyn Host,
    registry: &'a RuleRegistry,
    options: &'a Options,
    locks: FileLocks,
    cancel: CancelToken,
}

impl<'a> BatchFixEngine<'a> {
    pub fn new(host: &'a dyn Host, registry: &'a RuleRegistry, options: &'a Options) -> Self {
        Self {
            host,
            registry,
            options,
            locks: FileLocks::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Share a lock table with a rename resolver.
    pub fn with_locks(mut self, locks: FileLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run analysis and fix application to a fixed point.
    ///
    /// Returns the final trees plus the outcome. The pass budget defaults
    /// to the fixable-diagnostic count of the first analysis (floor 1) and
    /// can be overridden through `EngineOptions::max_passes`. On
    /// cancellation the in-flight pass is discarded whole; trees already
    /// rewritten by completed passes are kept.
    pub fn run(&self, scope: Scope, trees: Vec<SourceTree>) -> (Vec<SourceTree>, BatchOutcome) {
        let engine = AnalysisEngine::new(self.registry, self.options);
        let mut trees = trees;
        let mut outcome = BatchOutcome::default();
        let mut carried_failures: Vec<Diagnostic> = Vec::new();

        let mut result = engine.analyze(&trees, &self.cancel);
        let initial_fixable = self.count_fixable(&result.diagnostics, &scope);
        let budget = self
            .options
            .engine
            .max_passes
            .unwrap_or_else(|| initial_fixable.max(1));
        debug!(
            "batch fix: {} fixable diagnostic(s), pass budget {}",
            initial_fixable, budget
        );

        loop {
            // Cancellation is polled at every pass boundary
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let fixable = self.count_fixable(&result.diagnostics, &scope);
            if fixable == 0 {
                break;
            }
            if outcome.passes >= budget {
                warn!(
                    "batch fix stopped: pass budget {} exhausted with {} fixable diagnostic(s) left",
                    budget, fixable
                );
                outcome.budget_exhausted = true;
                break;
            }

            let mut session = self.build_session(scope.clone(), &result.diagnostics, &trees);
            carried_failures.append(&mut session.failures);
            if session.accepted.is_empty() {
                // Fixed point: nothing acceptable this pass
                break;
            }

            if self.cancel.is_cancelled() {
                // Discard the whole pass; pre-pass trees stay observable
                outcome.cancelled = true;
                break;
            }

            let applied = self.apply_session(&session, &mut trees, &mut carried_failures);
            outcome.applied_count += applied;
            outcome.passes += 1;
            debug!(
                "pass {}: applied {} edit(s), deferred {}",
                outcome.passes,
                applied,
                session.deferred.len()
            );

            result = engine.analyze(&trees, &self.cancel);
        }

        outcome.remaining = result.diagnostics;
        outcome.remaining.append(&mut carried_failures);
        (trees, outcome)
    }

    /// Fixable diagnostics: carrying a location, inside the scope, with a
    /// registered fix provider.
    fn count_fixable(&self, diagnostics: &[Diagnostic], scope: &Scope) -> usize {
        diagnostics
            .iter()
            .filter(|d| self.is_fixable(d, scope))
            .count()
    }

    fn is_fixable(&self, diagnostic: &Diagnostic, scope: &Scope) -> bool {
        diagnostic.has_location()
            && scope.includes(&diagnostic.file)
            && self
                .registry
                .get(&diagnostic.rule_id)
                .is_some_and(|entry| entry.is_fixable())
    }

    /// Build one pass: compute candidates against the pass snapshot, then
    /// run the acceptance sweep per file.
    fn build_session(
        &self,
        scope: Scope,
        diagnostics: &[Diagnostic],
        trees: &[SourceTree],
    ) -> BatchSession {
        let mut session = BatchSession::new(scope);
        let by_path: HashMap<&std::path::Path, &SourceTree> =
            trees.iter().map(|t| (t.path(), t)).collect();

        // Partition fixable diagnostics by containing file.
        let mut by_file: HashMap<PathBuf, Vec<&Diagnostic>> = HashMap::new();
        for diag in diagnostics {
            if self.is_fixable(diag, &session.scope) {
                by_file.entry(diag.file.clone()).or_default().push(diag);
            }
        }

        let mut files: Vec<_> = by_file.keys().cloned().collect();
        files.sort();

        let mut seq = 0usize;
        for file in files {
            let Some(snapshot) = by_path.get(file.as_path()).copied() else {
                continue;
            };
            let file_locked = self.locks.is_locked(&file);

            let mut candidates: Vec<Edit> = Vec::new();
            for diag in &by_file[&file] {
                // Spans are only valid against the version they were
                // computed from
                if diag.tree_version != snapshot.version() {
                    continue;
                }
                session.candidates.push((*diag).clone());

                let provider = self
                    .registry
                    .get(&diag.rule_id)
                    .and_then(|entry| entry.fix.as_ref());
                let Some(provider) = provider else { continue };

                match provider.compute_fix(snapshot, diag, self.options) {
                    Ok(Some(mut edit)) => {
                        edit.seq = seq;
                        seq += 1;
                        candidates.push(edit);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("fix provider for '{}' failed: {}", diag.rule_id, e);
                        session
                            .failures
                            .push(Diagnostic::internal_rule_error(&diag.rule_id, &e.to_string(), snapshot));
                    }
                }
            }

            if file_locked {
                // Rename in flight; the whole file waits for the next pass
                debug!("{} locked by a rename, deferring its edits", file.display());
                session.deferred.extend(candidates);
                continue;
            }

            // Acceptance sweep: start-offset order, registration order on
            // ties, first-accepted wins overlaps.
            sort_candidates(&mut candidates);
            let mut last_end: Option<u32> = None;
            for edit in candidates {
                let disjoint = last_end.map_or(true, |end| edit.span.start >= end);
                if disjoint {
                    last_end = Some(edit.span.end.max(last_end.unwrap_or(0)));
                    session.accepted.push(edit);
                } else {
                    session.deferred.push(edit);
                }
            }
        }

        session
    }

    /// Apply accepted edits, one composite rewrite per file, reparsing
    /// through the host. A file whose rewrite fails to parse reverts and
    /// is reported; other files keep their rewrites.
    fn apply_session(
        &self,
        session: &BatchSession,
        trees: &mut [SourceTree],
        failures: &mut Vec<Diagnostic>,
    ) -> usize {
        let mut by_file: HashMap<PathBuf, Vec<Edit>> = HashMap::new();
        for edit in &session.accepted {
            by_file.entry(edit.file.clone()).or_default().push(edit.clone());
        }

        let mut applied = 0usize;
        for (file, mut edits) in by_file {
            let Some(tree) = trees.iter_mut().find(|t| t.path() == file) else {
                continue;
            };
            let Some(_guard) = self.locks.try_lock_all(std::slice::from_ref(&file)) else {
                debug!("{} became locked, skipping this pass", file.display());
                continue;
            };

            sort_candidates(&mut edits);
            if let Some(stale) = edits.iter().find(|e| e.tree_version != tree.version()) {
                let err = EditError::StaleVersion {
                    edit: stale.tree_version,
                    tree: tree.version(),
                };
                warn!("skipping {}: {}", file.display(), err);
                continue;
            }
            let new_text = match apply_edits(tree.text(), &edits) {
                Ok(text) => text,
                Err(e) => {
                    warn!("composite rewrite of {} failed: {}", file.display(), e);
                    continue;
                }
            };

            match self.host.parse(&file, &new_text, tree.version() + 1) {
                Ok(new_tree) => {
                    applied += edits.len();
                    *tree = new_tree;
                }
                Err(e) => {
                    warn!("rewritten {} no longer parses, reverting: {}", file.display(), e);
                    failures.push(Diagnostic::file_level(
                        PARSE_ERROR_RULE,
                        Severity::Error,
                        &e.to_string(),
                        &file,
                        e.line(),
                    ));
                }
            }
        }

        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::FixProvider;
    use crate::options::Options;
    use crate::registry::RuleEntry;
    use crate::rule::{RuleAnalyzer, RuleCategory, RuleDescriptor, RuleError};
    use crate::testing::MockHost;
    use crate::tree::NodeId;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// Flags identifier tokens whose text contains a marker substring.
    struct FlagContaining {
        rule_id: &'static str,
        markers: &'static [&'static str],
    }

    impl RuleAnalyzer for FlagContaining {
        fn kinds(&self) -> &[&str] {
            &["identifier"]
        }

        fn check(
            &self,
            tree: &SourceTree,
            node: NodeId,
            _options: &Options,
        ) -> Result<Vec<Diagnostic>, RuleError> {
            let text = tree.node_text(node);
            if self.markers.iter().any(|m| text.contains(m)) {
                Ok(vec![Diagnostic::new(
                    self.rule_id,
                    Severity::Warning,
                    &format!("flagged '{}'", text),
                    tree,
                    tree.span(node),
                )])
            } else {
                Ok(Vec::new())
            }
        }
    }

    /// Replaces the flagged token with fixed text.
    struct ReplaceWith(&'static str);

    impl FixProvider for ReplaceWith {
        fn compute_fix(
            &self,
            tree: &SourceTree,
            diagnostic: &Diagnostic,
            _options: &Options,
        ) -> Result<Option<Edit>, RuleError> {
            Ok(Some(Edit::new(
                tree,
                diagnostic.span,
                self.0,
                &diagnostic.rule_id,
            )))
        }
    }

    fn flag_rule(
        rule_id: &'static str,
        markers: &'static [&'static str],
        replacement: &'static str,
    ) -> RuleEntry {
        RuleEntry::stateless(
            RuleDescriptor::new(rule_id, RuleCategory::Naming),
            Arc::new(FlagContaining { rule_id, markers }),
        )
        .with_fix(Arc::new(ReplaceWith(replacement)))
    }

    #[test]
    fn test_overlapping_fixes_resolve_over_two_passes() {
        // Scenario: two fixable diagnostics on the same token, so their
        // computed edits overlap. Pass 1 applies the first-registered edit
        // only; pass 2 applies the second on the rewritten file.
        let mut registry = RuleRegistry::new();
        registry
            .register(flag_rule("first-fix", &["BAD"], "foo_MID"))
            .unwrap();
        registry
            .register(flag_rule("second-fix", &["BAD", "MID"], "foo_ok"))
            .unwrap();

        let host = MockHost::new();
        let tree = host.add_file("a.src", "foo_BAD");
        let options = Options::default();
        let engine = BatchFixEngine::new(&host, &registry, &options);

        let (trees, outcome) = engine.run(Scope::Project, vec![tree]);
        assert_eq!(trees[0].text(), "foo_ok");
        assert_eq!(outcome.passes, 2);
        assert_eq!(outcome.applied_count, 2);
        assert!(!outcome.budget_exhausted);
        assert!(outcome.remaining.is_empty());
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        // Same span, same start offset: the first-registered rule wins
        // pass 1.
        let mut registry = RuleRegistry::new();
        registry
            .register(flag_rule("late-but-first", &["BAD"], "from_first"))
            .unwrap();
        registry
            .register(flag_rule("second", &["BAD"], "from_second"))
            .unwrap();

        let host = MockHost::new();
        let tree = host.add_file("a.src", "BAD_name");
        let options = Options::default();
        let engine = BatchFixEngine::new(&host, &registry, &options);

        let session = engine.build_session(
            Scope::Project,
            &AnalysisEngine::new(&registry, &options)
                .analyze(std::slice::from_ref(&tree), &CancelToken::new())
                .diagnostics,
            std::slice::from_ref(&tree),
        );
        assert_eq!(session.accepted.len(), 1);
        assert_eq!(session.accepted[0].replacement, "from_first");
        assert_eq!(session.deferred.len(), 1);
        assert_eq!(session.deferred[0].replacement, "from_second");
    }

    #[test]
    fn test_accepted_edits_never_overlap() {
        let mut registry = RuleRegistry::new();
        registry
            .register(flag_rule("first-fix", &["BAD"], "x"))
            .unwrap();
        registry
            .register(flag_rule("second-fix", &["BAD"], "y"))
            .unwrap();

        let host = MockHost::new();
        let tree = host.add_file("a.src", "one_BAD two_BAD three_BAD");
        let options = Options::default();
        let engine = BatchFixEngine::new(&host, &registry, &options);

        let diags = AnalysisEngine::new(&registry, &options)
            .analyze(std::slice::from_ref(&tree), &CancelToken::new())
            .diagnostics;
        let session = engine.build_session(Scope::Project, &diags, std::slice::from_ref(&tree));

        for (i, a) in session.accepted.iter().enumerate() {
            for b in &session.accepted[i + 1..] {
                assert!(!a.conflicts_with(b), "accepted edits overlap: {:?} / {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_fixed_point_is_idempotent() {
        let mut registry = RuleRegistry::new();
        registry
            .register(flag_rule("first-fix", &["BAD"], "clean"))
            .unwrap();

        let host = MockHost::new();
        let tree = host.add_file("a.src", "a_BAD b_BAD");
        let options = Options::default();
        let engine = BatchFixEngine::new(&host, &registry, &options);

        let (trees, outcome) = engine.run(Scope::Project, vec![tree]);
        assert_eq!(trees[0].text(), "clean clean");
        assert!(outcome.applied_count > 0);

        // Running again from the fixed point applies nothing
        let (trees, outcome) = engine.run(Scope::Project, trees);
        assert_eq!(outcome.applied_count, 0);
        assert_eq!(outcome.passes, 0);
        assert_eq!(trees[0].text(), "clean clean");
    }

    #[test]
    fn test_self_perpetuating_fix_stops_at_budget() {
        // Scenario: the fix re-introduces its own violation. The engine
        // must stop at the pass budget and surface the diagnostic.
        let mut registry = RuleRegistry::new();
        registry
            .register(flag_rule("self-perpetuating", &["ping"], "ping"))
            .unwrap();

        let host = MockHost::new();
        let tree = host.add_file("a.src", "ping");
        let options = Options::default();
        let engine = BatchFixEngine::new(&host, &registry, &options);

        let (trees, outcome) = engine.run(Scope::Project, vec![tree]);
        assert!(outcome.budget_exhausted);
        assert_eq!(trees[0].text(), "ping");
        assert!(outcome
            .remaining
            .iter()
            .any(|d| d.rule_id == "self-perpetuating"));
    }

    #[test]
    fn test_scope_excludes_other_files() {
        let mut registry = RuleRegistry::new();
        registry
            .register(flag_rule("first-fix", &["BAD"], "ok"))
            .unwrap();

        let host = MockHost::new();
        let a = host.add_file("a.src", "x_BAD");
        let b = host.add_file("b.src", "y_BAD");
        let options = Options::default();
        let engine = BatchFixEngine::new(&host, &registry, &options);

        let (trees, outcome) =
            engine.run(Scope::File(PathBuf::from("a.src")), vec![a, b]);
        let texts: Vec<_> = trees.iter().map(|t| t.text().to_string()).collect();
        assert!(texts.contains(&"ok".to_string()));
        assert!(texts.contains(&"y_BAD".to_string()));
        // The out-of-scope diagnostic is still reported, just not fixed
        assert!(outcome.remaining.iter().any(|d| d.file == PathBuf::from("b.src")));
    }

    #[test]
    fn test_locked_file_edits_deferred() {
        let mut registry = RuleRegistry::new();
        registry
            .register(flag_rule("first-fix", &["BAD"], "ok"))
            .unwrap();

        let host = MockHost::new();
        let tree = host.add_file("a.src", "x_BAD");
        let options = Options::default();
        let locks = FileLocks::new();
        let engine = BatchFixEngine::new(&host, &registry, &options).with_locks(locks.clone());

        let _held = locks.try_lock_all(&[PathBuf::from("a.src")]).unwrap();
        let (trees, outcome) = engine.run(Scope::Project, vec![tree]);
        // Nothing applied while the rename lock is held
        assert_eq!(outcome.applied_count, 0);
        assert_eq!(trees[0].text(), "x_BAD");
        assert!(outcome.remaining.iter().any(|d| d.rule_id == "first-fix"));
    }

    #[test]
    fn test_in_flight_rename_blocks_batch_pass() {
        // A resolved-but-uncommitted rename holds its file locked, so a
        // fix pass that would shift the rename's spans must wait. After
        // commit the next pass proceeds on the fresh tree.
        let mut registry = RuleRegistry::new();
        registry
            .register(flag_rule("first-fix", &["BAD"], "much_longer_name"))
            .unwrap();

        let host = MockHost::new();
        let trees = vec![host.add_file("a.src", "xx_BAD alpha")];
        let options = Options::default();
        let locks = FileLocks::new();
        let engine = BatchFixEngine::new(&host, &registry, &options).with_locks(locks.clone());
        let resolver = crate::rename::RenameResolver::new(&host).with_locks(locks.clone());

        let token = trees[0]
            .preorder()
            .find(|&n| trees[0].kind(n) == "identifier" && trees[0].node_text(n) == "alpha")
            .unwrap();
        let txn = resolver
            .rename(
                &trees,
                std::path::Path::new("a.src"),
                token,
                "beta",
                &Scope::Project,
                false,
            )
            .unwrap();

        let (trees, outcome) = engine.run(Scope::Project, trees);
        assert_eq!(outcome.applied_count, 0);
        assert_eq!(trees[0].text(), "xx_BAD alpha");
        assert_eq!(trees[0].version(), 1);

        let trees = resolver.commit(txn, trees).unwrap();
        assert_eq!(trees[0].text(), "xx_BAD beta");

        // Locks released; the deferred fix now applies cleanly
        let (trees, outcome) = engine.run(Scope::Project, trees);
        assert_eq!(outcome.applied_count, 1);
        assert_eq!(trees[0].text(), "much_longer_name beta");
    }

    #[test]
    fn test_cancellation_discards_pass() {
        let mut registry = RuleRegistry::new();
        registry
            .register(flag_rule("first-fix", &["BAD"], "ok"))
            .unwrap();

        let host = MockHost::new();
        let tree = host.add_file("a.src", "x_BAD");
        let options = Options::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let engine = BatchFixEngine::new(&host, &registry, &options).with_cancel(cancel);

        let (trees, outcome) = engine.run(Scope::Project, vec![tree]);
        assert!(outcome.cancelled);
        assert_eq!(outcome.applied_count, 0);
        assert_eq!(trees[0].text(), "x_BAD");
        assert_eq!(trees[0].version(), 1);
    }

    #[test]
    fn test_refusal_sentinel_marks_unfixed() {
        struct RefuseAll;

        impl FixProvider for RefuseAll {
            fn compute_fix(
                &self,
                _tree: &SourceTree,
                _diagnostic: &Diagnostic,
                _options: &Options,
            ) -> Result<Option<Edit>, RuleError> {
                Ok(None)
            }
        }

        let mut registry = RuleRegistry::new();
        registry
            .register(
                RuleEntry::stateless(
                    RuleDescriptor::new("no-fix-here", RuleCategory::Naming),
                    Arc::new(FlagContaining {
                        rule_id: "no-fix-here",
                        markers: &["BAD"],
                    }),
                )
                .with_fix(Arc::new(RefuseAll)),
            )
            .unwrap();

        let host = MockHost::new();
        let tree = host.add_file("a.src", "x_BAD");
        let options = Options::default();
        let engine = BatchFixEngine::new(&host, &registry, &options);

        let (trees, outcome) = engine.run(Scope::Project, vec![tree]);
        assert_eq!(outcome.applied_count, 0);
        assert_eq!(trees[0].text(), "x_BAD");
        assert!(outcome.remaining.iter().any(|d| d.rule_id == "no-fix-here"));
    }
}
