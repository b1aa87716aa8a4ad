//! Tracked integration instances. Owned exclusively by the engine;
//! status transitions are monotonic and terminal states are immutable.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gateway_core::types::{IntegrationInstance, IntegrationStatus};
use serde_json::Value;

#[derive(Default)]
pub struct InstanceStore {
    instances: DashMap<String, IntegrationInstance>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
        }
    }

    pub fn insert(&self, instance: IntegrationInstance) {
        self.instances.insert(instance.id.clone(), instance);
    }

    pub fn get(&self, id: &str) -> Option<IntegrationInstance> {
        self.instances.get(id).map(|i| i.clone())
    }

    pub fn all(&self) -> Vec<IntegrationInstance> {
        self.instances.iter().map(|i| i.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn complete(&self, id: &str, response_data: Value, processing_time_ms: u64) -> bool {
        self.transition(id, |instance| {
            instance.status = IntegrationStatus::Completed;
            instance.completed_at = Some(Utc::now());
            instance.response_data = Some(response_data);
            instance.processing_time_ms = Some(processing_time_ms);
        })
    }

    pub fn fail(&self, id: &str, error: &str, processing_time_ms: u64) -> bool {
        self.transition(id, |instance| {
            instance.status = IntegrationStatus::Failed;
            instance.completed_at = Some(Utc::now());
            instance.error = Some(error.to_string());
            instance.processing_time_ms = Some(processing_time_ms);
        })
    }

    fn transition(&self, id: &str, apply: impl FnOnce(&mut IntegrationInstance)) -> bool {
        let Some(mut entry) = self.instances.get_mut(id) else {
            tracing::warn!(integration_id = id, "transition on unknown instance ignored");
            return false;
        };
        if entry.status.is_terminal() {
            tracing::warn!(
                integration_id = id,
                status = ?entry.status,
                "transition on terminal instance ignored"
            );
            return false;
        }
        apply(&mut entry);
        true
    }

    /// Eviction hook for the embedding process: drop terminal instances
    /// finished before `cutoff`.
    pub fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.instances.len();
        self.instances.retain(|_, instance| {
            !(instance.status.is_terminal()
                && instance.completed_at.map(|at| at < cutoff).unwrap_or(false))
        });
        before - self.instances.len()
    }
}
