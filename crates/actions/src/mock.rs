//! Test doubles for [`Action`] and the collaborator traits.
//!
//! Useful in unit and integration tests where a real action or external
//! system is either unavailable or irrelevant.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::collaborators::{
    ExternalRequest, ExternalResponse, HttpClient, Notifier, Resource, ResourceCreator,
};
use crate::traits::{Action, ActionContext, ActionOutput};
use crate::ActionError;

// ---------------------------------------------------------------------------
// MockAction
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockAction` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON object.
    ReturnValue(Value),
    /// Fail with `ActionError::Failed` on every call.
    FailRetryable(String),
    /// Fail with `ActionError::Fatal` on every call.
    FailFatal(String),
    /// Fail (retryably) for the first `failures` calls, then return `value`.
    FailThenReturn { failures: usize, value: Value },
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub config: Value,
    /// Snapshot of the execution context the action saw.
    pub variables: Map<String, Value>,
}

/// A mock action that records every call it receives and returns a
/// programmer-specified result.
pub struct MockAction {
    /// Label included in the output as `"action"`.
    pub name: String,
    /// What the action will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All calls seen by this action (in call order).
    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockAction {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given object.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with `ActionError::Failed`.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailRetryable(msg.into()))
    }

    /// Create a mock that always fails with `ActionError::Fatal`.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailFatal(msg.into()))
    }

    /// Create a mock that fails `failures` times before succeeding.
    pub fn flaky(name: impl Into<String>, failures: usize, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailThenReturn { failures, value })
    }

    /// Number of times this action has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    fn output(&self, value: &Value) -> ActionOutput {
        // Merge the configured value with the action's own name so tests can
        // trace the data flowing through the context.
        let mut out = ActionOutput::new();
        out.insert("action".into(), json!(self.name));
        if let Some(obj) = value.as_object() {
            out.extend(obj.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }
}

#[async_trait]
impl Action for MockAction {
    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
        let call_number = {
            let mut calls = self.calls.lock();
            calls.push(MockCall {
                config: config.clone(),
                variables: ctx.variables.clone(),
            });
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(self.output(v)),
            MockBehaviour::FailRetryable(msg) => Err(ActionError::Failed(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(ActionError::Fatal(msg.clone())),
            MockBehaviour::FailThenReturn { failures, value } => {
                if call_number <= *failures {
                    Err(ActionError::Failed(format!("attempt {call_number} failed")))
                } else {
                    Ok(self.output(value))
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MockNotifier
// ---------------------------------------------------------------------------

/// Records `(target, message)` pairs instead of delivering them.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, target: &str, message: &str) -> Result<(), ActionError> {
        self.sent.lock().push((target.to_owned(), message.to_owned()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockResourceCreator
// ---------------------------------------------------------------------------

/// Hands out sequential ids (`res-1`, `res-2`, …) and completes instantly.
#[derive(Default)]
pub struct MockResourceCreator {
    specs: Mutex<Vec<Value>>,
    awaited: Mutex<Vec<String>>,
}

impl MockResourceCreator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Specs received by `create`, in order.
    pub fn specs(&self) -> Vec<Value> {
        self.specs.lock().clone()
    }

    /// Resource ids passed to `await_completion`, in order.
    pub fn awaited(&self) -> Vec<String> {
        self.awaited.lock().clone()
    }
}

#[async_trait]
impl ResourceCreator for MockResourceCreator {
    async fn create(&self, spec: &Value) -> Result<Resource, ActionError> {
        let mut specs = self.specs.lock();
        specs.push(spec.clone());
        let mut details = Map::new();
        details.insert("status".into(), json!("created"));
        Ok(Resource {
            id: format!("res-{}", specs.len()),
            details,
        })
    }

    async fn await_completion(
        &self,
        resource_id: &str,
        _timeout: Duration,
    ) -> Result<Map<String, Value>, ActionError> {
        self.awaited.lock().push(resource_id.to_owned());
        let mut outcome = Map::new();
        outcome.insert("status".into(), json!("completed"));
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// MockHttpClient
// ---------------------------------------------------------------------------

/// Replays queued responses (or repeats the last one) and records requests.
pub struct MockHttpClient {
    responses: Mutex<VecDeque<Result<ExternalResponse, ActionError>>>,
    fallback: ExternalResponse,
    requests: Mutex<Vec<ExternalRequest>>,
}

impl MockHttpClient {
    /// Always answer with `response`.
    pub fn responding(response: ExternalResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: response,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `scripted` in order, then fall back to `fallback`.
    pub fn scripted(
        scripted: Vec<Result<ExternalResponse, ActionError>>,
        fallback: ExternalResponse,
    ) -> Self {
        Self {
            responses: Mutex::new(scripted.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExternalRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn request(&self, request: ExternalRequest) -> Result<ExternalResponse, ActionError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
