//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow and an execution
//! look like in memory. They serialise to/from the camelCase JSON shapes
//! consumed from the definition layer and produced for inspection tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// The execution context: a JSON object threaded through every step.
pub type Context = Map<String, Value>;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trigger {
    /// Fired by `trigger_workflow(name, payload)`. `"*"` matches every event.
    Event {
        #[serde(rename = "event")]
        name: String,
        /// Re-checked against the trigger context before the workflow runs.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conditions: Option<Map<String, Value>>,
    },
    /// Fired by a dedicated timer every `interval` milliseconds.
    Schedule {
        #[serde(rename = "interval")]
        interval_ms: u64,
    },
    /// Fired by the scheduler tick once a day at local `HH:MM`.
    Time {
        #[serde(rename = "time")]
        hhmm: String,
    },
}

impl Trigger {
    /// Shorthand for an unconditional event trigger.
    pub fn event(name: impl Into<String>) -> Self {
        Self::Event {
            name: name.into(),
            conditions: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// Attempts and linear back-off for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before attempt `n + 1` is `backoff_ms * n`.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1_000,
        }
    }
}

/// What happens to the execution when a step ends `failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Carry on with the next step; the context is left untouched.
    #[default]
    Continue,
    /// End the execution as `failed`.
    Stop,
}

/// A single step in the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique identifier within this workflow.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Maps to a registered action.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Arbitrary configuration passed to the action at execution time.
    #[serde(default)]
    pub config: Value,
    /// Overrides the workflow's `retryPolicy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub on_failure: OnFailure,
}

impl Step {
    /// Convenience constructor for testing.
    pub fn new(id: impl Into<String>, action_type: impl Into<String>, config: Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            action_type: action_type.into(),
            config,
            retry: None,
            on_failure: OnFailure::Continue,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.retry = Some(RetryPolicy {
            max_attempts,
            backoff_ms,
        });
        self
    }

    pub fn stop_on_failure(mut self) -> Self {
        self.on_failure = OnFailure::Stop;
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowConfig / WorkflowDefinition
// ---------------------------------------------------------------------------

fn default_enabled() -> bool {
    true
}

/// A workflow as supplied by the definition layer: the definition minus
/// runtime fields. Also the export format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Initial execution context.
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

impl WorkflowConfig {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, triggers: Vec<Trigger>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            enabled: true,
            triggers,
            steps,
            variables: Map::new(),
            retry_policy: None,
        }
    }
}

/// A registered workflow. Immutable once stored; executions share it via
/// `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub triggers: Vec<Trigger>,
    pub steps: Vec<Step>,
    pub variables: Map<String, Value>,
    pub retry_policy: RetryPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Build a definition from its config, resolving `retryPolicy` against
    /// `default_retry`.
    pub fn from_config(
        id: impl Into<String>,
        config: WorkflowConfig,
        default_retry: &RetryPolicy,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: config.name,
            description: config.description,
            enabled: config.enabled,
            triggers: config.triggers,
            steps: config.steps,
            variables: config.variables,
            retry_policy: config.retry_policy.unwrap_or_else(|| default_retry.clone()),
            created_at,
            updated_at: Utc::now(),
        }
    }

    /// The definition minus runtime fields.
    pub fn export(&self) -> WorkflowConfig {
        WorkflowConfig {
            name: self.name.clone(),
            description: self.description.clone(),
            enabled: self.enabled,
            triggers: self.triggers.clone(),
            steps: self.steps.clone(),
            variables: self.variables.clone(),
            retry_policy: Some(self.retry_policy.clone()),
        }
    }

    /// `step.retry` if set, else the workflow policy.
    pub fn retry_for<'a>(&'a self, step: &'a Step) -> &'a RetryPolicy {
        step.retry.as_ref().unwrap_or(&self.retry_policy)
    }
}

// ---------------------------------------------------------------------------
// Trigger payload
// ---------------------------------------------------------------------------

/// Name used as `event` in the trigger payload of timer-driven runs.
pub const SCHEDULE_EVENT: &str = "schedule";

/// Name used as `event` in the trigger payload of explicit runs.
pub const MANUAL_EVENT: &str = "manual";

/// The trigger payload merged over workflow variables at execution start:
/// `{ event, data, timestamp }`.
pub fn trigger_payload(event: &str, data: Value) -> Context {
    let mut payload = Context::new();
    payload.insert("event".into(), json!(event));
    payload.insert("data".into(), data);
    payload.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
    payload
}

/// `variables` merged with `payload` (payload wins on collisions).
pub fn seed_context(variables: &Context, payload: &Context) -> Context {
    let mut context = variables.clone();
    context.extend(payload.iter().map(|(k, v)| (k.clone(), v.clone())));
    context
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
    /// Waiting out the back-off before the next attempt.
    Retrying,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Outcome of one step, including all of its attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub status: StepStatus,
    pub attempts: u32,
    /// The action output merged into the context (`null` until it succeeds).
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: Option<u64>,
}

impl StepResult {
    pub fn started(step: &Step) -> Self {
        Self {
            id: step.id.clone(),
            name: step.name.clone(),
            action_type: step.action_type.clone(),
            status: StepStatus::Running,
            attempts: 0,
            data: Value::Null,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    pub(crate) fn finish(&mut self, status: StepStatus) {
        let now = Utc::now();
        self.status = status;
        self.duration_ms = Some(elapsed_ms(self.started_at, now));
        self.completed_at = Some(now);
    }
}

/// One concrete run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub context: Context,
    pub steps: Vec<StepResult>,
    pub logs: Vec<LogEntry>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    /// A fresh `running` execution.
    pub fn start(workflow_id: impl Into<String>, context: Context) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            context,
            steps: Vec::new(),
            logs: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    pub fn is_terminal(&self) -> bool {
        self.status != ExecutionStatus::Running
    }

    /// Move to a terminal status. A no-op once terminal, so the status never
    /// reverts.
    pub(crate) fn finish(&mut self, status: ExecutionStatus, error: Option<String>) {
        if self.is_terminal() || status == ExecutionStatus::Running {
            return;
        }
        let now = Utc::now();
        self.status = status;
        self.error = error;
        self.duration_ms = Some(elapsed_ms(self.started_at, now));
        self.completed_at = Some(now);
    }

    /// When the record stopped changing (or started, while running).
    pub fn finished_or_started(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.started_at)
    }
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}
