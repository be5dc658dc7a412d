//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the per-run state machine:
//! 1. Seeds the context with the workflow variables and the trigger payload.
//! 2. Runs the steps strictly in order, dispatching each through the
//!    [`ActionRegistry`].
//! 3. Merges each successful step's output into the context.
//! 4. Retries handler rejections with linear back-off (`backoffMs * attempt`)
//!    until the step's `maxAttempts` is used up.
//! 5. Ends early, `completed`, when a step reports `shouldStop`, or `failed`
//!    when a step with `onFailure: stop` fails.
//!
//! Every state change is republished to [`ActiveExecutions`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, instrument, warn};

use actions::{ActionContext, ActionRegistry, Collaborators, SHOULD_STOP};

use crate::history::ActiveExecutions;
use crate::models::{
    seed_context, Context, Execution, ExecutionStatus, OnFailure, Step, StepResult, StepStatus,
    WorkflowDefinition, MANUAL_EVENT,
};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Step outcome
// ---------------------------------------------------------------------------

/// Why an execution stopped before its last step.
#[derive(Debug)]
enum HaltReason {
    /// A step's output carried `shouldStop: true`. Not an error.
    ConditionNotMet { step_id: String },
    /// A step with `onFailure: stop` failed.
    StepFailed(EngineError),
}

#[derive(Debug)]
enum StepFlow {
    Continue,
    Halt(HaltReason),
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Runs single executions. Holds no per-run state, so one executor serves
/// any number of concurrent runs.
#[derive(Debug)]
pub struct WorkflowExecutor {
    actions: Arc<ActionRegistry>,
    collaborators: Collaborators,
}

impl WorkflowExecutor {
    pub fn new(actions: Arc<ActionRegistry>, collaborators: Collaborators) -> Self {
        Self {
            actions,
            collaborators,
        }
    }

    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    /// Run `definition` to a terminal state and return the record.
    ///
    /// Never fails as a call: step errors end up in the returned
    /// [`Execution`] (`status`, `error` and the step's `StepResult`).
    #[instrument(skip(self, definition, payload, active), fields(workflow_id = %definition.id))]
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        payload: Context,
        active: &ActiveExecutions,
    ) -> Execution {
        let mut execution = Execution::start(
            definition.id.clone(),
            seed_context(&definition.variables, &payload),
        );
        let event = payload.get("event").and_then(Value::as_str).unwrap_or(MANUAL_EVENT);
        execution.log(format!(
            "Execution started for workflow '{}' (event '{}')",
            definition.name, event
        ));
        info!(execution_id = %execution.id, "execution started (event '{}')", event);
        active.publish(&execution);

        for step in &definition.steps {
            match self.run_step(definition, step, &mut execution, active).await {
                StepFlow::Continue => {}

                StepFlow::Halt(HaltReason::ConditionNotMet { step_id }) => {
                    execution.log(format!(
                        "Condition in step '{step_id}' not met; stopping early"
                    ));
                    info!("condition in step '{}' not met, stopping early", step_id);
                    break;
                }

                StepFlow::Halt(HaltReason::StepFailed(err)) => {
                    let message = err.to_string();
                    execution.log(format!("Execution failed: {message}"));
                    error!(execution_id = %execution.id, "execution failed: {}", message);
                    execution.finish(ExecutionStatus::Failed, Some(message));
                    break;
                }
            }
        }

        // No-op if a stop-on-failure step already failed the run.
        execution.finish(ExecutionStatus::Completed, None);
        if execution.status == ExecutionStatus::Completed {
            execution.log("Execution completed");
            info!(
                execution_id = %execution.id,
                "execution completed in {}ms",
                execution.duration_ms.unwrap_or_default()
            );
        }

        active.remove(execution.id);
        execution
    }

    // -----------------------------------------------------------------------
    // Internal: execute a single step with retry logic.
    // -----------------------------------------------------------------------

    async fn run_step(
        &self,
        definition: &WorkflowDefinition,
        step: &Step,
        execution: &mut Execution,
        active: &ActiveExecutions,
    ) -> StepFlow {
        let policy = definition.retry_for(step).clone();
        let max_attempts = policy.max_attempts.max(1);

        execution.steps.push(StepResult::started(step));
        let slot = execution.steps.len() - 1;
        execution.log(format!("Executing step '{}' ({})", step.name, step.action_type));

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            {
                let result = &mut execution.steps[slot];
                result.attempts = attempt;
                result.status = StepStatus::Running;
            }
            active.publish(execution);

            let outcome = {
                let ctx = ActionContext {
                    workflow_id: &definition.id,
                    execution_id: execution.id,
                    step_id: &step.id,
                    variables: &execution.context,
                    collaborators: &self.collaborators,
                };
                self.actions.execute(&step.action_type, &step.config, &ctx).await
            };

            match outcome {
                Ok(output) => {
                    let should_stop = output
                        .get(SHOULD_STOP)
                        .and_then(Value::as_bool)
                        .unwrap_or(false);

                    execution.context.extend(output.clone());
                    let result = &mut execution.steps[slot];
                    result.data = Value::Object(output);
                    result.error = None;
                    result.finish(StepStatus::Completed);
                    execution.log(format!(
                        "Step '{}' completed after {} attempt(s)",
                        step.id, attempt
                    ));
                    info!("step '{}' completed (attempt {})", step.id, attempt);
                    active.publish(execution);

                    return if should_stop {
                        StepFlow::Halt(HaltReason::ConditionNotMet {
                            step_id: step.id.clone(),
                        })
                    } else {
                        StepFlow::Continue
                    };
                }

                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = Duration::from_millis(
                        policy.backoff_ms.saturating_mul(u64::from(attempt)),
                    );
                    let result = &mut execution.steps[slot];
                    result.status = StepStatus::Retrying;
                    result.error = Some(err.to_string());
                    execution.log(format!(
                        "Step '{}' attempt {}/{} failed: {}; retrying in {}ms",
                        step.id,
                        attempt,
                        max_attempts,
                        err,
                        delay.as_millis()
                    ));
                    warn!(
                        "step '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                        step.id, attempt, max_attempts, delay, err
                    );
                    active.publish(execution);

                    tokio::time::sleep(delay).await;
                }

                Err(err) => {
                    let failure = if err.is_retryable() {
                        EngineError::StepRetryExhausted {
                            step_id: step.id.clone(),
                            attempts: attempt,
                            message: err.to_string(),
                        }
                    } else {
                        EngineError::ActionExecution {
                            step_id: step.id.clone(),
                            message: err.to_string(),
                        }
                    };

                    let result = &mut execution.steps[slot];
                    result.error = Some(err.to_string());
                    result.finish(StepStatus::Failed);
                    execution.log(format!("Step '{}' failed: {}", step.id, failure));
                    error!("{}", failure);
                    active.publish(execution);

                    return match step.on_failure {
                        OnFailure::Stop => StepFlow::Halt(HaltReason::StepFailed(failure)),
                        OnFailure::Continue => StepFlow::Continue,
                    };
                }
            }
        }
    }
}
