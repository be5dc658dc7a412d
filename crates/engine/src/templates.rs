//! Reusable workflow blueprints.
//!
//! A [`WorkflowTemplate`] is a workflow without identity or runtime state.
//! [`WorkflowTemplate::instantiate`] turns one into a [`WorkflowConfig`]
//! ready for `define`, applying caller overrides.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::{RetryPolicy, Step, Trigger, WorkflowConfig};
use crate::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// Caller-supplied changes applied on instantiation. Unset fields keep the
/// template's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOverrides {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Merged over the template variables; keys here win.
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

impl TemplateOverrides {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }
}

impl WorkflowTemplate {
    pub fn instantiate(&self, overrides: TemplateOverrides) -> WorkflowConfig {
        let mut variables = self.variables.clone();
        variables.extend(overrides.variables);

        WorkflowConfig {
            name: overrides.name.unwrap_or_else(|| self.name.clone()),
            description: overrides
                .description
                .unwrap_or_else(|| self.description.clone()),
            enabled: overrides.enabled.unwrap_or(true),
            triggers: self.triggers.clone(),
            steps: self.steps.clone(),
            variables,
            retry_policy: overrides.retry_policy,
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateCatalog
// ---------------------------------------------------------------------------

/// Templates keyed by id. Starts empty; callers register their own.
#[derive(Debug, Default)]
pub struct TemplateCatalog {
    templates: RwLock<BTreeMap<String, WorkflowTemplate>>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template.
    pub fn register(&self, template: WorkflowTemplate) {
        debug!("registering workflow template '{}'", template.id);
        self.templates.write().insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> Option<WorkflowTemplate> {
        self.templates.read().get(id).cloned()
    }

    /// All templates, sorted by id.
    pub fn list(&self) -> Vec<WorkflowTemplate> {
        self.templates.read().values().cloned().collect()
    }

    /// Templates whose `category` matches.
    pub fn by_category(&self, category: &str) -> Vec<WorkflowTemplate> {
        self.templates
            .read()
            .values()
            .filter(|t| t.category == category)
            .cloned()
            .collect()
    }

    /// # Errors
    /// [`EngineError::TemplateNotFound`] for an unknown id.
    pub fn instantiate(
        &self,
        template_id: &str,
        overrides: TemplateOverrides,
    ) -> Result<WorkflowConfig, EngineError> {
        let templates = self.templates.read();
        let template = templates
            .get(template_id)
            .ok_or_else(|| EngineError::TemplateNotFound(template_id.to_owned()))?;
        Ok(template.instantiate(overrides))
    }
}
