//! Trigger lookup.
//!
//! Entries are keyed by signature: `event:<name>` for event triggers
//! (`event:*` for the wildcard) and `schedule` for interval and clock
//! triggers. Each entry keeps the original [`Trigger`] so callers can
//! re-check per-trigger conditions.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::Trigger;

/// Event name that subscribes to every event.
pub const WILDCARD: &str = "*";

/// Key shared by all interval and clock triggers.
pub const SCHEDULE_KEY: &str = "schedule";

/// One `(workflow, trigger)` subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub workflow_id: String,
    pub trigger: Trigger,
}

/// The index key a trigger is stored under.
pub fn signature(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Event { name, .. } => event_key(name),
        Trigger::Schedule { .. } | Trigger::Time { .. } => SCHEDULE_KEY.to_owned(),
    }
}

fn event_key(name: &str) -> String {
    format!("event:{name}")
}

#[derive(Debug, Default)]
pub struct TriggerIndex {
    entries: RwLock<HashMap<String, Vec<IndexEntry>>>,
}

impl TriggerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one subscription. Registering the same pair twice stores it
    /// twice; each copy needs its own `unregister`.
    pub fn register(&self, workflow_id: &str, trigger: &Trigger) {
        self.entries
            .write()
            .entry(signature(trigger))
            .or_default()
            .push(IndexEntry {
                workflow_id: workflow_id.to_owned(),
                trigger: trigger.clone(),
            });
    }

    /// Remove one subscription matching `(workflow_id, trigger)`.
    ///
    /// Returns `false` if no such entry existed. Empty keys are dropped.
    pub fn unregister(&self, workflow_id: &str, trigger: &Trigger) -> bool {
        let key = signature(trigger);
        let mut entries = self.entries.write();
        let Some(bucket) = entries.get_mut(&key) else {
            return false;
        };

        let position = bucket
            .iter()
            .position(|e| e.workflow_id == workflow_id && &e.trigger == trigger);
        let removed = position.map(|i| bucket.remove(i)).is_some();

        if bucket.is_empty() {
            entries.remove(&key);
        }
        removed
    }

    /// Subscribers of `event_name`: exact matches followed by wildcard
    /// subscribers.
    pub fn lookup(&self, event_name: &str) -> Vec<IndexEntry> {
        let entries = self.entries.read();
        let mut found: Vec<IndexEntry> = entries
            .get(&event_key(event_name))
            .cloned()
            .unwrap_or_default();

        if event_name != WILDCARD {
            if let Some(wildcards) = entries.get(&event_key(WILDCARD)) {
                found.extend(wildcards.iter().cloned());
            }
        }
        found
    }

    /// All interval and clock subscriptions.
    pub fn scheduled(&self) -> Vec<IndexEntry> {
        self.entries
            .read()
            .get(SCHEDULE_KEY)
            .cloned()
            .unwrap_or_default()
    }

    /// Entries referencing `workflow_id`, across all keys.
    pub fn count_for(&self, workflow_id: &str) -> usize {
        self.entries
            .read()
            .values()
            .flatten()
            .filter(|e| e.workflow_id == workflow_id)
            .count()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
