//! `condition`: pure branch gate.
//!
//! Outputs `{ result, shouldStop: !result }`; the engine ends the execution
//! early (as completed) when it sees `shouldStop: true`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::parse_config;
use crate::conditions::evaluate;
use crate::interpolate::interpolate_value;
use crate::traits::{Action, ActionContext, ActionOutput};
use crate::ActionError;

/// Key the engine inspects to halt a run without failing it.
pub const SHOULD_STOP: &str = "shouldStop";

#[derive(Debug, Deserialize)]
struct ConditionConfig {
    #[serde(default)]
    conditions: Map<String, Value>,
}

/// Evaluate `config.conditions` against the execution context.
///
/// Operand values are interpolated first, so thresholds may come from
/// workflow variables.
pub async fn condition(config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let cfg: ConditionConfig = parse_config(config.clone())?;
    let conditions: Map<String, Value> = cfg
        .conditions
        .iter()
        .map(|(path, expected)| (path.clone(), interpolate_value(expected, ctx.variables)))
        .collect();

    let result = evaluate(&conditions, ctx.variables);

    let mut out = ActionOutput::new();
    out.insert("result".into(), json!(result));
    out.insert(SHOULD_STOP.into(), json!(!result));
    Ok(out)
}

/// Registry wrapper around [`condition`].
pub struct Condition;

#[async_trait]
impl Action for Condition {
    async fn execute(&self, config: &Value, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
        condition(config, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::test_support::Harness;

    #[tokio::test]
    async fn passing_conditions_do_not_stop() {
        let h = Harness::new(json!({ "data": { "total": 150 }, "threshold": 100 }));
        let out = condition(
            &json!({ "conditions": {
                "data.total": { "operator": "greaterThan", "value": "{{threshold}}" }
            } }),
            &h.ctx(),
        )
        .await
        .unwrap();
        assert_eq!(out["result"], json!(true));
        assert_eq!(out[SHOULD_STOP], json!(false));
    }

    #[tokio::test]
    async fn failing_conditions_request_stop() {
        let h = Harness::new(json!({ "data": { "status": "open" } }));
        let out = condition(&json!({ "conditions": { "data.status": "paid" } }), &h.ctx())
            .await
            .unwrap();
        assert_eq!(out["result"], json!(false));
        assert_eq!(out[SHOULD_STOP], json!(true));
    }
}
