//! `actions` crate: the `Action` trait, the action registry, the built-in
//! actions, and the template/condition helpers they share with the engine.
//!
//! Every action, built-in or registered at runtime, must implement
//! [`Action`]. The engine crate dispatches step execution through
//! [`ActionRegistry`].

pub mod builtin;
pub mod collaborators;
pub mod conditions;
pub mod error;
pub mod http;
pub mod interpolate;
pub mod mock;
pub mod registry;
pub mod traits;

pub use builtin::BuiltinAction;
pub use builtin::condition::SHOULD_STOP;
pub use collaborators::{Collaborators, HttpClient, Notifier, ResourceCreator};
pub use error::{ActionError, ConditionError};
pub use http::ReqwestHttpClient;
pub use registry::ActionRegistry;
pub use traits::{Action, ActionContext, ActionOutput};
