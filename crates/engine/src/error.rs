//! Engine-level error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors produced by the workflow engine (definition, dispatch, execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Definition errors ------

    /// Every structural problem found in a workflow definition.
    #[error("invalid workflow definition: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A `time` trigger whose value is not `HH:MM`.
    #[error("invalid clock time '{0}', expected HH:MM")]
    InvalidClockTime(String),

    /// Interval timers and the scheduler tick need a Tokio runtime.
    #[error("no Tokio runtime available to start scheduler timers")]
    NoRuntime,

    #[error("workflow template '{0}' not found")]
    TemplateNotFound(String),

    // ------ Lookup errors ------

    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    /// A disabled workflow was executed explicitly.
    #[error("workflow '{0}' is disabled")]
    WorkflowDisabled(String),

    // ------ Execution errors ------

    /// The step failed without a handler running, e.g. an unknown action type.
    #[error("step '{step_id}' failed: {message}")]
    ActionExecution { step_id: String, message: String },

    /// The action kept failing until `maxAttempts` was reached.
    #[error("step '{step_id}' failed after {attempts} attempt(s): {message}")]
    StepRetryExhausted {
        step_id: String,
        attempts: u32,
        message: String,
    },

    // ------ Configuration ------

    #[error(transparent)]
    Config(#[from] ConfigError),
}
