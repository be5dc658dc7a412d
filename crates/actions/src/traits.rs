//! The `Action` trait: the contract every step handler must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::collaborators::Collaborators;
use crate::ActionError;

/// What an action hands back: a partial context update.
///
/// The engine merges it into the execution context (later keys win) and
/// stores it as the step's `data`.
pub type ActionOutput = Map<String, Value>;

/// Everything an action may read while it runs.
///
/// Defined here (in the actions crate) so both the engine and individual
/// action implementations can import it without a circular dependency.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    /// ID of the parent workflow.
    pub workflow_id: &'a str,
    /// ID of the current execution run.
    pub execution_id: uuid::Uuid,
    /// ID of the step being executed.
    pub step_id: &'a str,
    /// The execution context as of this step: workflow variables, trigger
    /// payload and the output of every completed step so far.
    pub variables: &'a Map<String, Value>,
    /// External collaborator handles.
    pub collaborators: &'a Collaborators,
}

/// The core action trait.
///
/// Built-in actions and any handler registered at runtime implement this.
/// `config` is the step's raw configuration; handlers interpolate it
/// themselves when they want `{{path}}` placeholders resolved.
#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(
        &self,
        config: &Value,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutput, ActionError>;
}
