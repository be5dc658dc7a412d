//! The `WorkflowEngine` facade: owns the registries, the scheduler, the
//! executor and the history, and routes triggers to executions.
//!
//! Every execution runs on its own Tokio task. Concurrent executions share
//! only the immutable `Arc<WorkflowDefinition>` they were started from.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Local, TimeZone, Utc};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use actions::{conditions, Action, ActionError, ActionRegistry, Collaborators};

use crate::config::EngineConfig;
use crate::executor::WorkflowExecutor;
use crate::history::{ActiveExecutions, ExecutionHistory};
use crate::models::{
    seed_context, trigger_payload, Context, Execution, Trigger, WorkflowConfig,
    WorkflowDefinition, MANUAL_EVENT, SCHEDULE_EVENT,
};
use crate::registry::WorkflowRegistry;
use crate::scheduler::{spawn_ticker, ClockTime, FireFn, Scheduler};
use crate::templates::{TemplateCatalog, TemplateOverrides};
use crate::trigger_index::TriggerIndex;
use crate::EngineError;

/// An execution started by a scheduler tick.
#[derive(Debug)]
pub struct Dispatched {
    pub workflow_id: String,
    pub handle: JoinHandle<Execution>,
}

// ---------------------------------------------------------------------------
// EngineInner
// ---------------------------------------------------------------------------

struct EngineInner {
    config: EngineConfig,
    registry: WorkflowRegistry,
    executor: WorkflowExecutor,
    history: ExecutionHistory,
    active: ActiveExecutions,
    ticker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl EngineInner {
    /// Run one execution to completion and record it.
    async fn run(&self, definition: &WorkflowDefinition, payload: Context) -> Execution {
        self.registry.scheduler().record_start(&definition.id, Utc::now());
        let execution = self.executor.run(definition, payload, &self.active).await;
        self.history.append(execution.clone());
        execution
    }

    /// Start `run` on its own task.
    fn dispatch(self: &Arc<Self>, definition: Arc<WorkflowDefinition>, payload: Context) -> JoinHandle<Execution> {
        let inner = self.clone();
        tokio::spawn(async move { inner.run(&definition, payload).await })
    }

    async fn fire_interval(&self, workflow_id: String, interval_ms: u64) {
        let Some(definition) = self.registry.get(&workflow_id) else {
            debug!("interval fired for removed workflow '{}'", workflow_id);
            return;
        };
        if !definition.enabled {
            debug!("skipping disabled workflow '{}' on interval", workflow_id);
            return;
        }
        let payload = trigger_payload(SCHEDULE_EVENT, json!({ "intervalMs": interval_ms }));
        self.run(&definition, payload).await;
    }

    fn tick_at<Tz: TimeZone>(self: &Arc<Self>, now: &DateTime<Tz>) -> Result<Vec<Dispatched>, EngineError> {
        // Checked before any claim so a failed tick leaves every window open.
        tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let mut fired = Vec::new();

        for entry in self.registry.index().scheduled() {
            let Trigger::Time { hhmm } = &entry.trigger else {
                continue;
            };
            match self.claim_clock_trigger(&entry.workflow_id, hhmm, now) {
                Ok(Some(definition)) => {
                    info!("clock trigger {} fired for workflow '{}'", hhmm, entry.workflow_id);
                    let payload = trigger_payload(SCHEDULE_EVENT, json!({ "time": hhmm }));
                    fired.push(Dispatched {
                        workflow_id: entry.workflow_id.clone(),
                        handle: self.dispatch(definition, payload),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(
                    "scheduler tick: skipping workflow '{}': {}",
                    entry.workflow_id, e
                ),
            }
        }
        Ok(fired)
    }

    fn claim_clock_trigger<Tz: TimeZone>(
        &self,
        workflow_id: &str,
        hhmm: &str,
        now: &DateTime<Tz>,
    ) -> Result<Option<Arc<WorkflowDefinition>>, EngineError> {
        let at = ClockTime::parse(hhmm)?;
        let definition = self
            .registry
            .get(workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_owned()))?;
        if !definition.enabled {
            return Ok(None);
        }
        let claimed = self.registry.scheduler().claim_clock(workflow_id, at, now);
        Ok(claimed.then_some(definition))
    }

    fn stop_ticker(&self) -> bool {
        match self.ticker.lock().take() {
            Some((token, _handle)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.stop_ticker();
        self.registry.scheduler().shutdown();
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    /// Build an engine.
    ///
    /// # Errors
    /// [`EngineError::Config`] if `config` fails validation.
    pub fn new(
        config: EngineConfig,
        actions: ActionRegistry,
        collaborators: Collaborators,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| {
            let weak = weak.clone();
            let fire: FireFn = Arc::new(move |workflow_id: String, interval_ms: u64| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_interval(workflow_id, interval_ms).await;
                    }
                }
                .boxed()
            });

            EngineInner {
                registry: WorkflowRegistry::new(
                    Scheduler::new(config.clock_tolerance(), fire),
                    config.default_retry.clone(),
                ),
                executor: WorkflowExecutor::new(Arc::new(actions), collaborators),
                history: ExecutionHistory::new(config.history_max_entries, config.history_max_age()),
                active: ActiveExecutions::new(),
                ticker: Mutex::new(None),
                config,
            }
        });

        Ok(Self { inner })
    }

    /// An engine with default config, every built-in action and the given
    /// collaborators.
    pub fn with_builtins(collaborators: Collaborators) -> Result<Self, EngineError> {
        Self::new(EngineConfig::default(), ActionRegistry::with_builtins(), collaborators)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    pub fn actions(&self) -> &ActionRegistry {
        self.inner.executor.actions()
    }

    /// Register (or replace) an action handler. Takes effect for steps that
    /// start after this call, including those of already-defined workflows.
    pub fn register_action(
        &self,
        action_type: impl Into<String>,
        handler: Arc<dyn Action>,
    ) -> Result<(), ActionError> {
        self.actions().register(action_type, handler)
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Validate and store a workflow, wiring up its triggers.
    pub fn define(&self, id: &str, config: WorkflowConfig) -> Result<Arc<WorkflowDefinition>, EngineError> {
        self.inner.registry.define(id, config)
    }

    /// Same as [`define`](Self::define); the counterpart of
    /// [`export`](Self::export).
    pub fn import(&self, id: &str, config: WorkflowConfig) -> Result<Arc<WorkflowDefinition>, EngineError> {
        self.define(id, config)
    }

    pub fn export(&self, id: &str) -> Result<WorkflowConfig, EngineError> {
        self.get(id)
            .map(|definition| definition.export())
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_owned()))
    }

    /// Instantiate `template_id` from `catalog` and define it as `id`.
    pub fn define_from_template(
        &self,
        catalog: &TemplateCatalog,
        template_id: &str,
        id: &str,
        overrides: TemplateOverrides,
    ) -> Result<Arc<WorkflowDefinition>, EngineError> {
        let config = catalog.instantiate(template_id, overrides)?;
        self.define(id, config)
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.inner.registry.get(id)
    }

    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.inner.registry.list()
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Arc<WorkflowDefinition>, EngineError> {
        self.inner.registry.set_enabled(id, enabled)
    }

    /// Remove a workflow. Executions already running are left alone.
    pub fn delete(&self, id: &str) -> Result<(), EngineError> {
        self.inner.registry.delete(id).map(|_| ())
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Fire `event` with `data` as the payload and wait for every workflow it
    /// starts.
    ///
    /// Workflows subscribed by exact name or `"*"` are considered; disabled
    /// ones and those whose trigger conditions fail against
    /// `variables + {event, data, timestamp}` are skipped. A workflow with
    /// several matching triggers runs once. An event nobody listens to is a
    /// no-op returning an empty list.
    #[instrument(skip(self, data))]
    pub async fn trigger_workflow(&self, event: &str, data: Value) -> Vec<Execution> {
        let payload = trigger_payload(event, data);
        let mut started: HashSet<String> = HashSet::new();
        let mut handles = Vec::new();

        for entry in self.inner.registry.index().lookup(event) {
            if started.contains(&entry.workflow_id) {
                continue;
            }
            let Some(definition) = self.inner.registry.get(&entry.workflow_id) else {
                continue;
            };
            if !definition.enabled {
                debug!("skipping disabled workflow '{}'", definition.id);
                continue;
            }
            if let Trigger::Event {
                conditions: Some(trigger_conditions),
                ..
            } = &entry.trigger
            {
                let context = seed_context(&definition.variables, &payload);
                if !conditions::evaluate(trigger_conditions, &context) {
                    debug!("trigger conditions not met for workflow '{}'", definition.id);
                    continue;
                }
            }

            started.insert(entry.workflow_id.clone());
            handles.push(self.inner.dispatch(definition, payload.clone()));
        }

        if handles.is_empty() {
            debug!("no workflow started by event '{}'", event);
            return Vec::new();
        }
        info!("event '{}' started {} workflow(s)", event, handles.len());
        collect(handles).await
    }

    /// Run a workflow directly, regardless of its triggers.
    ///
    /// # Errors
    /// [`EngineError::WorkflowNotFound`] or [`EngineError::WorkflowDisabled`].
    #[instrument(skip(self, data))]
    pub async fn execute_workflow(&self, id: &str, data: Value) -> Result<Execution, EngineError> {
        let definition = self
            .get(id)
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_owned()))?;
        if !definition.enabled {
            return Err(EngineError::WorkflowDisabled(id.to_owned()));
        }
        Ok(self
            .inner
            .run(&definition, trigger_payload(MANUAL_EVENT, data))
            .await)
    }

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    /// Evaluate every clock trigger against `now` (in `now`'s timezone) and
    /// start the due ones. Returns the executions started.
    ///
    /// # Errors
    /// [`EngineError::NoRuntime`] outside a Tokio runtime. No trigger is
    /// claimed in that case.
    pub fn tick_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<Vec<Dispatched>, EngineError> {
        self.inner.tick_at(now)
    }

    /// Start the periodic tick, evaluated in local time. Restarting replaces
    /// the previous tick loop.
    ///
    /// # Errors
    /// [`EngineError::NoRuntime`] outside a Tokio runtime.
    pub fn start(&self) -> Result<(), EngineError> {
        let token = CancellationToken::new();
        let weak = Arc::downgrade(&self.inner);
        let handle = spawn_ticker(self.inner.config.tick_interval(), token.clone(), move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            if let Err(e) = inner.tick_at(&Local::now()) {
                warn!("scheduler tick failed: {}", e);
            }
            true
        })?;

        if let Some((previous, _)) = self.inner.ticker.lock().replace((token, handle)) {
            previous.cancel();
        }
        info!(
            "scheduler started (tick every {}ms)",
            self.inner.config.tick_interval_ms
        );
        Ok(())
    }

    /// Stop the tick and every interval timer. In-flight executions finish.
    pub fn shutdown(&self) {
        let was_running = self.inner.stop_ticker();
        self.inner.registry.scheduler().shutdown();
        if was_running {
            info!("scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.ticker.lock().is_some()
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn history(&self) -> &ExecutionHistory {
        &self.inner.history
    }

    pub fn execution(&self, execution_id: Uuid) -> Option<Execution> {
        self.inner
            .active
            .get(execution_id)
            .or_else(|| self.inner.history.get(execution_id))
    }

    pub fn active_executions(&self) -> Vec<Execution> {
        self.inner.active.list()
    }

    pub fn trigger_index(&self) -> &TriggerIndex {
        self.inner.registry.index()
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.inner.registry.scheduler()
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("workflows", &self.inner.registry.len())
            .field("active", &self.inner.active.len())
            .field("history", &self.inner.history.len())
            .finish()
    }
}

async fn collect(handles: Vec<JoinHandle<Execution>>) -> Vec<Execution> {
    join_all(handles)
        .await
        .into_iter()
        .filter_map(|joined| match joined {
            Ok(execution) => Some(execution),
            Err(e) => {
                error!("execution task did not finish: {}", e);
                None
            }
        })
        .collect()
}
