//! `createResource`: hand an interpolated spec to the resource creator.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::parse_config;
use crate::interpolate::interpolate_value;
use crate::traits::{Action, ActionContext, ActionOutput};
use crate::ActionError;

const DEFAULT_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResourceConfig {
    spec: Value,
    #[serde(default)]
    wait_for_completion: bool,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Create the resource and, when `waitForCompletion` is set, wait for it.
///
/// Output is `{ resourceId, ...details }`, followed by the completion fields
/// when waiting.
pub async fn create_resource(config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let cfg: CreateResourceConfig = parse_config(interpolate_value(config, ctx.variables))?;
    let creator = ctx
        .collaborators
        .resources
        .as_ref()
        .ok_or(ActionError::Unavailable("resource creator"))?;

    let resource = creator.create(&cfg.spec).await?;
    debug!(resource_id = %resource.id, step_id = ctx.step_id, "resource created");

    let mut out = ActionOutput::new();
    out.insert("resourceId".into(), json!(resource.id));
    out.extend(resource.details);

    if cfg.wait_for_completion {
        let outcome = creator
            .await_completion(&resource.id, Duration::from_millis(cfg.timeout_ms))
            .await?;
        out.extend(outcome);
    }

    Ok(out)
}

/// Registry wrapper around [`create_resource`].
pub struct CreateResource;

#[async_trait]
impl Action for CreateResource {
    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
        create_resource(config, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::Harness;
    use crate::collaborators::Collaborators;
    use crate::mock::MockResourceCreator;
    use std::sync::Arc;

    #[tokio::test]
    async fn creates_from_interpolated_spec() {
        let creator = Arc::new(MockResourceCreator::new());
        let h = Harness::new(json!({ "data": { "title": "Outage" } }))
            .with_collaborators(Collaborators::new().with_resources(creator.clone()));

        let out = create_resource(
            &json!({ "spec": { "title": "Investigate {{data.title}}", "priority": 1 } }),
            &h.ctx(),
        )
        .await
        .unwrap();

        assert_eq!(out["resourceId"], json!("res-1"));
        assert!(out.get("status").is_none());
        assert_eq!(
            creator.specs(),
            vec![json!({ "title": "Investigate Outage", "priority": 1 })]
        );
    }

    #[tokio::test]
    async fn waits_for_completion_when_asked() {
        let creator = Arc::new(MockResourceCreator::new());
        let h = Harness::new(json!({}))
            .with_collaborators(Collaborators::new().with_resources(creator.clone()));

        let out = create_resource(
            &json!({ "spec": {}, "waitForCompletion": true, "timeoutMs": 10 }),
            &h.ctx(),
        )
        .await
        .unwrap();

        assert_eq!(out["resourceId"], json!("res-1"));
        assert_eq!(out["status"], json!("completed"));
        assert_eq!(creator.awaited(), vec!["res-1".to_string()]);
    }

    #[tokio::test]
    async fn missing_creator_is_unavailable() {
        let h = Harness::new(json!({}));
        let err = create_resource(&json!({ "spec": {} }), &h.ctx()).await.unwrap_err();
        assert_eq!(err, ActionError::Unavailable("resource creator"));
    }
}
