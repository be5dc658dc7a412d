//! Stored workflow definitions and their trigger wiring.
//!
//! Every mutation keeps three structures in step: the definition map, the
//! [`TriggerIndex`] and the scheduler's interval timers. Deleting or
//! redefining a workflow removes exactly what defining it added.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::models::{RetryPolicy, Trigger, WorkflowConfig, WorkflowDefinition};
use crate::scheduler::Scheduler;
use crate::trigger_index::TriggerIndex;
use crate::validate::validate_workflow;
use crate::EngineError;

#[derive(Debug)]
pub struct WorkflowRegistry {
    definitions: RwLock<HashMap<String, Arc<WorkflowDefinition>>>,
    index: TriggerIndex,
    scheduler: Scheduler,
    default_retry: RetryPolicy,
}

impl WorkflowRegistry {
    pub fn new(scheduler: Scheduler, default_retry: RetryPolicy) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            index: TriggerIndex::new(),
            scheduler,
            default_retry,
        }
    }

    /// Validate and store `config` under `id`, replacing any previous
    /// definition (whose triggers and timers are torn down first).
    ///
    /// # Errors
    /// - [`EngineError::Validation`] if the config is malformed.
    /// - [`EngineError::NoRuntime`] if it has interval triggers and no Tokio
    ///   runtime is running.
    ///
    /// Nothing is changed when an error is returned.
    pub fn define(&self, id: &str, config: WorkflowConfig) -> Result<Arc<WorkflowDefinition>, EngineError> {
        validate_workflow(id, &config)?;

        let has_intervals = config
            .triggers
            .iter()
            .any(|t| matches!(t, Trigger::Schedule { .. }));
        if has_intervals && tokio::runtime::Handle::try_current().is_err() {
            return Err(EngineError::NoRuntime);
        }

        let mut definitions = self.definitions.write();

        let created_at = match definitions.get(id) {
            Some(previous) => {
                let created_at = previous.created_at;
                self.unwire(previous);
                created_at
            }
            None => Utc::now(),
        };

        let definition = Arc::new(WorkflowDefinition::from_config(
            id,
            config,
            &self.default_retry,
            created_at,
        ));
        self.wire(&definition)?;
        definitions.insert(id.to_owned(), definition.clone());

        info!(
            "workflow '{}' defined ({} step(s), {} trigger(s))",
            id,
            definition.steps.len(),
            definition.triggers.len()
        );
        Ok(definition)
    }

    /// Flip `enabled`. Triggers stay registered; disabled workflows are
    /// skipped at dispatch.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Arc<WorkflowDefinition>, EngineError> {
        let mut definitions = self.definitions.write();
        let current = definitions
            .get(id)
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_owned()))?;

        let mut updated = WorkflowDefinition::clone(current);
        updated.enabled = enabled;
        updated.updated_at = Utc::now();
        let updated = Arc::new(updated);
        definitions.insert(id.to_owned(), updated.clone());

        info!("workflow '{}' {}", id, if enabled { "enabled" } else { "disabled" });
        Ok(updated)
    }

    /// Remove a workflow with all of its index entries and timers.
    /// In-flight executions keep running.
    ///
    /// Timers stop first, then index entries, then the definition.
    pub fn delete(&self, id: &str) -> Result<Arc<WorkflowDefinition>, EngineError> {
        let mut definitions = self.definitions.write();
        let current = definitions
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_owned()))?;

        self.unwire(&current);
        self.scheduler.forget(id);
        definitions.remove(id);
        info!("workflow '{}' deleted", id);
        Ok(current)
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.read().get(id).cloned()
    }

    /// All definitions, sorted by id.
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut all: Vec<_> = self.definitions.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }

    pub fn index(&self) -> &TriggerIndex {
        &self.index
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn default_retry(&self) -> &RetryPolicy {
        &self.default_retry
    }

    // -----------------------------------------------------------------------
    // Internal: trigger wiring
    // -----------------------------------------------------------------------

    fn wire(&self, definition: &WorkflowDefinition) -> Result<(), EngineError> {
        for trigger in &definition.triggers {
            if let Trigger::Schedule { interval_ms } = trigger {
                if let Err(e) = self
                    .scheduler
                    .schedule_interval(&definition.id, Duration::from_millis(*interval_ms))
                {
                    // Roll back the timers already started for this definition.
                    self.scheduler.cancel(&definition.id);
                    return Err(e);
                }
            }
        }
        for trigger in &definition.triggers {
            self.index.register(&definition.id, trigger);
        }
        debug!(
            "workflow '{}' wired: {} index entr(ies), {} timer(s)",
            definition.id,
            self.index.count_for(&definition.id),
            self.scheduler.timer_count(&definition.id)
        );
        Ok(())
    }

    fn unwire(&self, definition: &WorkflowDefinition) {
        let stopped = self.scheduler.cancel(&definition.id);
        for trigger in &definition.triggers {
            self.index.unregister(&definition.id, trigger);
        }
        debug!(
            "workflow '{}' unwired ({} timer(s) stopped)",
            definition.id, stopped
        );
    }
}
