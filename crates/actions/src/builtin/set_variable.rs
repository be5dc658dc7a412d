//! `setVariable`: resolve templates and merge them into the context.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::parse_config;
use crate::interpolate::interpolate_value;
use crate::traits::{Action, ActionContext, ActionOutput};
use crate::ActionError;

#[derive(Debug, Deserialize)]
struct SetVariableConfig {
    #[serde(default)]
    variables: Map<String, Value>,
}

pub async fn set_variable(config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let cfg: SetVariableConfig = parse_config(config.clone())?;
    Ok(cfg
        .variables
        .iter()
        .map(|(key, template)| (key.clone(), interpolate_value(template, ctx.variables)))
        .collect())
}

/// Registry wrapper around [`set_variable`].
pub struct SetVariable;

#[async_trait]
impl Action for SetVariable {
    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
        set_variable(config, ctx).await
    }
}
