//! External collaborators reachable from action handlers.
//!
//! The engine never calls these directly; only the built-in actions (and any
//! custom action that wants them) do, through [`Collaborators`] on the
//! [`ActionContext`](crate::traits::ActionContext).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::ActionError;

// ---------------------------------------------------------------------------
// Resource creation
// ---------------------------------------------------------------------------

/// A unit of external work created by the `createResource` action.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: String,
    /// Extra fields merged into the step output next to `resourceId`.
    pub details: Map<String, Value>,
}

/// Creates (and optionally waits on) units of external work.
#[async_trait]
pub trait ResourceCreator: Send + Sync {
    /// Create a resource from an already-interpolated spec.
    async fn create(&self, spec: &Value) -> Result<Resource, ActionError>;

    /// Block until the resource reaches a terminal state or `timeout` elapses.
    ///
    /// Returns the fields describing the final state.
    async fn await_completion(
        &self,
        resource_id: &str,
        timeout: Duration,
    ) -> Result<Map<String, Value>, ActionError>;
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Delivers a message to an external channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, target: &str, message: &str) -> Result<(), ActionError>;
}

// ---------------------------------------------------------------------------
// External HTTP
// ---------------------------------------------------------------------------

/// One outbound request issued by `callExternal`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// What came back. A non-2xx status is a response, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalResponse {
    pub status: u16,
    pub data: Value,
}

impl ExternalResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single request. Transport failures are `ActionError::Failed`
/// so step-level retry applies.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: ExternalRequest) -> Result<ExternalResponse, ActionError>;
}

// ---------------------------------------------------------------------------
// Handle bundle
// ---------------------------------------------------------------------------

/// Collaborator handles shared by every execution.
///
/// All handles are optional; an action needing a missing one fails with
/// [`ActionError::Unavailable`].
#[derive(Clone, Default)]
pub struct Collaborators {
    pub resources: Option<Arc<dyn ResourceCreator>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub http: Option<Arc<dyn HttpClient>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceCreator>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("resources", &self.resources.is_some())
            .field("notifier", &self.notifier.is_some())
            .field("http", &self.http.is_some())
            .finish()
    }
}
