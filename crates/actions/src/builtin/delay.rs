//! `delay`: suspend the current execution for `durationMs`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_config;
use crate::interpolate::interpolate_value;
use crate::traits::{Action, ActionContext, ActionOutput};
use crate::ActionError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DelayConfig {
    duration_ms: u64,
}

/// Sleep on the Tokio timer; other executions and the scheduler keep running.
pub async fn delay(config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let cfg: DelayConfig = parse_config(interpolate_value(config, ctx.variables))?;
    tokio::time::sleep(Duration::from_millis(cfg.duration_ms)).await;

    let mut out = ActionOutput::new();
    out.insert("delayed".into(), json!(cfg.duration_ms));
    Ok(out)
}

/// Registry wrapper around [`delay`].
pub struct Delay;

#[async_trait]
impl Action for Delay {
    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
        delay(config, ctx).await
    }
}
