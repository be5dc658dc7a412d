//! `callExternal`: one outbound request through the HTTP collaborator.
//!
//! No retry of its own: a transport failure surfaces as a retryable
//! [`ActionError::Failed`] and step-level retry takes over. A non-2xx status
//! is reported as `success: false`, not as an error.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_config;
use crate::collaborators::ExternalRequest;
use crate::interpolate::interpolate_value;
use crate::traits::{Action, ActionContext, ActionOutput};
use crate::ActionError;

#[derive(Debug, Deserialize)]
struct CallExternalConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
}

fn default_method() -> String {
    "GET".to_owned()
}

pub async fn call_external(config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let cfg: CallExternalConfig = parse_config(interpolate_value(config, ctx.variables))?;
    let http = ctx
        .collaborators
        .http
        .as_ref()
        .ok_or(ActionError::Unavailable("http client"))?;

    let response = http
        .request(ExternalRequest {
            url: cfg.url,
            method: cfg.method.to_uppercase(),
            headers: cfg.headers,
            body: cfg.body,
        })
        .await?;

    let mut out = ActionOutput::new();
    out.insert("success".into(), json!(response.is_success()));
    out.insert("status".into(), json!(response.status));
    out.insert("data".into(), response.data);
    Ok(out)
}

/// Registry wrapper around [`call_external`].
pub struct CallExternal;

#[async_trait]
impl Action for CallExternal {
    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
        call_external(config, ctx).await
    }
}
