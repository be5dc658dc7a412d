//! Workflow validation. Run this before storing a definition.
//!
//! Rules enforced:
//! 1. The workflow id and name are not blank.
//! 2. There is at least one step.
//! 3. Step IDs are non-blank and unique; step types are non-blank.
//! 4. Retry policies allow at least one attempt.
//! 5. Triggers are well-formed: event names non-blank, intervals non-zero,
//!    clock times parse as `HH:MM`.
//!
//! Unlike a fail-fast check, every problem is collected so the caller sees
//! the whole list at once.

use std::collections::HashSet;

use crate::models::{RetryPolicy, Trigger, WorkflowConfig};
use crate::scheduler::ClockTime;
use crate::EngineError;

/// Validate a workflow config about to be stored under `id`.
///
/// # Errors
/// [`EngineError::Validation`] listing every problem found.
pub fn validate_workflow(id: &str, config: &WorkflowConfig) -> Result<(), EngineError> {
    let mut problems = Vec::new();

    if id.trim().is_empty() {
        problems.push("workflow id must not be blank".to_owned());
    }
    if config.name.trim().is_empty() {
        problems.push("workflow name must not be blank".to_owned());
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------
    if config.steps.is_empty() {
        problems.push("workflow must declare at least one step".to_owned());
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for (i, step) in config.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            problems.push(format!("step #{} has a blank id", i + 1));
        } else if !seen_ids.insert(step.id.as_str()) {
            problems.push(format!("duplicate step id '{}'", step.id));
        }
        if step.action_type.trim().is_empty() {
            problems.push(format!("step #{} has a blank type", i + 1));
        }
        if let Some(retry) = &step.retry {
            check_retry(&format!("step '{}' retry", step.id), retry, &mut problems);
        }
    }

    if let Some(retry) = &config.retry_policy {
        check_retry("retryPolicy", retry, &mut problems);
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------
    for (i, trigger) in config.triggers.iter().enumerate() {
        match trigger {
            Trigger::Event { name, .. } if name.trim().is_empty() => {
                problems.push(format!("trigger #{} has a blank event name", i + 1));
            }
            Trigger::Schedule { interval_ms: 0 } => {
                problems.push(format!("trigger #{} has a zero interval", i + 1));
            }
            Trigger::Time { hhmm } => {
                if let Err(e) = ClockTime::parse(hhmm) {
                    problems.push(format!("trigger #{}: {e}", i + 1));
                }
            }
            _ => {}
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation(problems))
    }
}

fn check_retry(label: &str, retry: &RetryPolicy, problems: &mut Vec<String>) {
    if retry.max_attempts == 0 {
        problems.push(format!("{label}: maxAttempts must be at least 1"));
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Step;
    use serde_json::json;

    fn make_step(id: &str) -> Step {
        Step::new(id, "notify", json!({ "message": "hi" }))
    }

    #[test]
    fn minimal_workflow_is_valid() {
        let config = WorkflowConfig::new("ok", vec![Trigger::event("a.b")], vec![make_step("s1")]);
        validate_workflow("wf", &config).expect("should be valid");
    }

    #[test]
    fn workflow_without_triggers_is_valid() {
        // Manual-only workflows are run through `execute_workflow`.
        let config = WorkflowConfig::new("manual", vec![], vec![make_step("s1")]);
        assert!(validate_workflow("wf", &config).is_ok());
    }

    #[test]
    fn empty_steps_are_rejected() {
        let config = WorkflowConfig::new("empty", vec![], vec![]);
        assert!(matches!(
            validate_workflow("wf", &config),
            Err(EngineError::Validation(problems)) if problems.len() == 1
        ));
    }

    #[test]
    fn every_problem_is_reported() {
        let mut config = WorkflowConfig::new(
            " ",
            vec![
                Trigger::event(""),
                Trigger::Schedule { interval_ms: 0 },
                Trigger::Time { hhmm: "25:00".into() },
            ],
            vec![
                make_step("a"),
                make_step("a"),
                Step::new("", "", json!(null)).with_retry(0, 10),
            ],
        );
        config.retry_policy = Some(RetryPolicy { max_attempts: 0, backoff_ms: 0 });

        let Err(EngineError::Validation(problems)) = validate_workflow("", &config) else {
            panic!("expected validation error");
        };

        // id, name, duplicate, blank id, blank type, step retry, workflow retry,
        // blank event, zero interval, bad time
        assert_eq!(problems.len(), 10, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("duplicate step id 'a'")));
        assert!(problems.iter().any(|p| p.contains("25:00")));
    }
}
