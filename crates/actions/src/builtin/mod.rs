//! Built-in actions.
//!
//! Each action is a free function taking the step config and an explicit
//! [`ActionContext`](crate::traits::ActionContext), wrapped in a unit struct
//! so it can sit in the [`ActionRegistry`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::registry::ActionRegistry;
use crate::ActionError;

pub mod call_external;
pub mod condition;
pub mod create_resource;
pub mod delay;
pub mod notify;
pub mod set_variable;

pub use call_external::CallExternal;
pub use condition::Condition;
pub use create_resource::CreateResource;
pub use delay::Delay;
pub use notify::Notify;
pub use set_variable::SetVariable;

/// Names of the actions shipped with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinAction {
    CreateResource,
    Notify,
    CallExternal,
    Condition,
    Delay,
    SetVariable,
}

impl BuiltinAction {
    pub const ALL: [BuiltinAction; 6] = [
        Self::CreateResource,
        Self::Notify,
        Self::CallExternal,
        Self::Condition,
        Self::Delay,
        Self::SetVariable,
    ];

    /// The `type` string steps use to select this action.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::CreateResource => "createResource",
            Self::Notify => "notify",
            Self::CallExternal => "callExternal",
            Self::Condition => "condition",
            Self::Delay => "delay",
            Self::SetVariable => "setVariable",
        }
    }
}

/// Install every built-in into `registry`.
///
/// # Errors
/// The first registration the registry rejects.
pub fn register_all(registry: &ActionRegistry) -> Result<(), ActionError> {
    for action in BuiltinAction::ALL {
        let handler: Arc<dyn crate::Action> = match action {
            BuiltinAction::CreateResource => Arc::new(CreateResource),
            BuiltinAction::Notify => Arc::new(Notify),
            BuiltinAction::CallExternal => Arc::new(CallExternal),
            BuiltinAction::Condition => Arc::new(Condition),
            BuiltinAction::Delay => Arc::new(Delay),
            BuiltinAction::SetVariable => Arc::new(SetVariable),
        };
        registry.register(action.type_name(), handler)?;
    }
    Ok(())
}

/// Deserialize an (already interpolated) config into the action's typed
/// shape.
pub(crate) fn parse_config<T: DeserializeOwned>(config: Value) -> Result<T, ActionError> {
    serde_json::from_value(config).map_err(|e| ActionError::InvalidConfig(e.to_string()))
}
