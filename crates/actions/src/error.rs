//! Action-level error types.

use thiserror::Error;

/// Errors returned by an action's `execute` method or by the registry.
///
/// Every rejection a handler returns is retried by the engine with linear
/// back-off until the step's `maxAttempts` is used up. `UnknownAction` and
/// `InvalidRegistration` come from the registry, not a handler, and end the
/// step on the first attempt.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    /// Transient failure, such as a dropped connection.
    #[error("action failed: {0}")]
    Failed(String),

    /// The handler gave up on its own terms.
    #[error("fatal action error: {0}")]
    Fatal(String),

    /// The step's `config` is missing a field or has the wrong shape.
    #[error("invalid action config: {0}")]
    InvalidConfig(String),

    /// A collaborator the action depends on was never configured.
    #[error("collaborator unavailable: {0}")]
    Unavailable(&'static str),

    /// No handler is registered under this action type.
    #[error("no action registered for type '{0}'")]
    UnknownAction(String),

    /// Rejected at registration time.
    #[error("invalid action registration: {0}")]
    InvalidRegistration(String),
}

impl ActionError {
    /// Whether the engine may re-attempt the step after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownAction(_) | Self::InvalidRegistration(_))
    }
}

/// A malformed condition entry.
///
/// Never surfaced to callers: the evaluator logs it and treats the entry as
/// passing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditionError {
    #[error("condition on '{path}' has a non-string operator")]
    MalformedOperator { path: String },

    #[error("condition on '{path}' has a value but no operator")]
    MissingOperator { path: String },

    #[error("condition on '{path}' uses unknown operator '{operator}'")]
    UnknownOperator { path: String, operator: String },

    #[error("condition on '{path}' has an invalid pattern: {reason}")]
    InvalidPattern { path: String, reason: String },
}
