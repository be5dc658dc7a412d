//! `engine` crate: workflow models, validation, trigger routing, the
//! scheduler and the execution state machine.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod history;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod templates;
pub mod trigger_index;
pub mod validate;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Dispatched, WorkflowEngine};
pub use error::EngineError;
pub use executor::WorkflowExecutor;
pub use history::{ActiveExecutions, ExecutionHistory, HistoryStats};
pub use models::{
    Execution, ExecutionStatus, OnFailure, RetryPolicy, Step, StepResult, StepStatus, Trigger,
    WorkflowConfig, WorkflowDefinition,
};
pub use registry::WorkflowRegistry;
pub use templates::{TemplateCatalog, TemplateOverrides, WorkflowTemplate};
pub use trigger_index::TriggerIndex;
pub use validate::validate_workflow;
