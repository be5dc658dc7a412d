//! `notify`: deliver a message to the log sink or the notifier collaborator.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::parse_config;
use crate::interpolate::interpolate_str;
use crate::traits::{Action, ActionContext, ActionOutput};
use crate::ActionError;

/// Target that always goes to the tracing log, even with a notifier wired.
pub const LOG_TARGET: &str = "log";

#[derive(Debug, Deserialize)]
struct NotifyConfig {
    message: Value,
    #[serde(default = "default_target")]
    target: String,
}

fn default_target() -> String {
    LOG_TARGET.to_owned()
}

/// Send `config.message` (interpolated) to `config.target`.
pub async fn notify(config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let cfg: NotifyConfig = parse_config(config.clone())?;
    let template = match &cfg.message {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let message = interpolate_str(&template, ctx.variables);
    let target = interpolate_str(&cfg.target, ctx.variables);

    match ctx.collaborators.notifier.as_ref() {
        Some(notifier) if target != LOG_TARGET => notifier.send(&target, &message).await?,
        _ => info!(
            workflow_id = ctx.workflow_id,
            step_id = ctx.step_id,
            "[notify] {}",
            message
        ),
    }

    let mut out = ActionOutput::new();
    out.insert("sent".into(), json!(true));
    out.insert("message".into(), json!(message));
    out.insert("target".into(), json!(target));
    Ok(out)
}

/// Registry wrapper around [`notify`].
pub struct Notify;

#[async_trait]
impl Action for Notify {
    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
        notify(config, ctx).await
    }
}
