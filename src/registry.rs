//! Static rule registry
//!
//! Rules and fix providers are registered explicitly at startup and looked
//! up by id thereafter; there is no dynamic discovery. Registration order
//! is preserved because it breaks ties between edits at the same offset.

use crate::fix::FixProvider;
use crate::rule::{AggregatingRule, RuleAnalyzer, RuleDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// The analyzer behind one rule id.
#[derive(Clone)]
pub enum Analyzer {
    Stateless(Arc<dyn RuleAnalyzer>),
    Aggregating(Arc<dyn AggregatingRule>),
}

/// One registered rule: descriptor, analyzer and optional fix provider.
#[derive(Clone)]
pub struct RuleEntry {
    pub descriptor: RuleDescriptor,
    pub analyzer: Analyzer,
    pub fix: Option<Arc<dyn FixProvider>>,
}

impl RuleEntry {
    pub fn stateless(descriptor: RuleDescriptor, analyzer: Arc<dyn RuleAnalyzer>) -> Self {
        Self {
            descriptor,
            analyzer: Analyzer::Stateless(analyzer),
            fix: None,
        }
    }

    pub fn aggregating(descriptor: RuleDescriptor, rule: Arc<dyn AggregatingRule>) -> Self {
        Self {
            descriptor,
            analyzer: Analyzer::Aggregating(rule),
            fix: None,
        }
    }

    pub fn with_fix(mut self, provider: Arc<dyn FixProvider>) -> Self {
        self.fix = Some(provider);
        self
    }

    pub fn is_fixable(&self) -> bool {
        self.fix.is_some()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate rule id: {0}")]
    Duplicate(String),
}

/// Mapping from rule id to entry, populated once at startup.
#[derive(Default)]
pub struct RuleRegistry {
    by_id: HashMap<String, usize>,
    entries: Vec<RuleEntry>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in rule set.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::rules::register_builtin(&mut registry)
            .unwrap_or_else(|e| unreachable!("builtin rule ids collide: {}", e));
        registry
    }

    /// Register one rule. Ids must be unique process-wide.
    pub fn register(&mut self, entry: RuleEntry) -> Result<(), RegistryError> {
        let id = entry.descriptor.id.clone();
        if self.by_id.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.by_id.insert(id, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, rule_id: &str) -> Option<&RuleEntry> {
        self.by_id.get(rule_id).map(|&i| &self.entries[i])
    }

    /// Position in registration order, used for edit tie-breaking.
    pub fn registration_index(&self, rule_id: &str) -> Option<usize> {
        self.by_id.get(rule_id).copied()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RuleEntry> {
        self.entries.iter()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &RuleDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
