//! Rule storage seam. Persistence technology is an external concern;
//! the engine only needs rules by id.

use crate::rule::TransformationRule;
use dashmap::DashMap;
use std::sync::Arc;

pub trait RuleRepository: Send + Sync {
    fn rule(&self, rule_id: &str) -> Option<Arc<TransformationRule>>;
}

/// DashMap-backed repository, suitable for rules pushed from an external
/// store. Updates replace the stored `Arc`, so in-flight transforms keep
/// the version they resolved.
#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: DashMap<String, Arc<TransformationRule>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
        }
    }

    pub fn upsert(&self, rule: TransformationRule) {
        self.rules.insert(rule.id.clone(), Arc::new(rule));
    }

    pub fn remove(&self, rule_id: &str) -> bool {
        self.rules.remove(rule_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn rule(&self, rule_id: &str) -> Option<Arc<TransformationRule>> {
        self.rules.get(rule_id).map(|r| r.clone())
    }
}
