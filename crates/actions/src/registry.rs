//! Runtime-extensible dispatch table from action type to handler.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::builtin;
use crate::traits::{Action, ActionContext, ActionOutput};
use crate::ActionError;

/// Maps `type` strings to shared [`Action`] implementations.
///
/// Registration goes through `&self`, so new action types can be added after
/// workflows referencing them have already been defined. Lookups for unknown
/// types fail at execution time, not at workflow definition time.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Action>>>,
}

impl ActionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with every built-in action.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        if let Err(e) = builtin::register_all(&registry) {
            error!("failed to register built-in actions: {}", e);
        }
        registry
    }

    /// Register (or replace) the handler for `action_type`.
    ///
    /// # Errors
    /// [`ActionError::InvalidRegistration`] for a blank type name.
    pub fn register(
        &self,
        action_type: impl Into<String>,
        handler: Arc<dyn Action>,
    ) -> Result<(), ActionError> {
        let action_type = action_type.into();
        if action_type.trim().is_empty() {
            return Err(ActionError::InvalidRegistration(
                "action type must not be blank".into(),
            ));
        }

        debug!("registering action '{}'", action_type);
        self.handlers.write().insert(action_type, handler);
        Ok(())
    }

    /// Look up the handler for `action_type`.
    pub fn get(&self, action_type: &str) -> Result<Arc<dyn Action>, ActionError> {
        self.handlers
            .read()
            .get(action_type)
            .cloned()
            .ok_or_else(|| ActionError::UnknownAction(action_type.to_owned()))
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.handlers.read().contains_key(action_type)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Resolve and run the handler for `action_type`.
    pub async fn execute(
        &self,
        action_type: &str,
        config: &serde_json::Value,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutput, ActionError> {
        let handler = self.get(action_type)?;
        handler.execute(config, ctx).await
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("types", &self.types())
            .finish()
    }
}
