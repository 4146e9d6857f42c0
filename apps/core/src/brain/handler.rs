use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::access::User;
use crate::error::AppError;

/// Per-request context handed to every intent handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteContext {
    /// Identifier used to correlate logs for one request.
    pub request_id: Uuid,
    /// Identity of the caller, when known.
    #[serde(default)]
    pub user: Option<String>,
    /// Role name of the caller, when known.
    #[serde(default)]
    pub role: Option<String>,
    /// Free-form values supplied by the calling layer.
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl Default for RouteContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user: None,
            role: None,
            values: Map::new(),
        }
    }

    /// Context for a request made by an authenticated user.
    pub fn for_user(user: &User) -> Self {
        Self {
            user: Some(user.identity.clone()),
            role: Some(user.role.clone()),
            ..Self::new()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// What a handler hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerReply {
    /// The request was served; the payload goes back to the caller.
    Payload(Value),
    /// The handler needs more information before it can act.
    Clarify(String),
}

/// Defines the interface every intent handler implements.
///
/// Errors are caught at the router boundary and reported as a failed route,
/// so a failing service never takes the whole chat request down with it.
#[async_trait]
pub trait IntentHandler: Send + Sync + 'static {
    /// Serves one message that was classified as this handler's intent.
    async fn handle(&self, message: &str, context: &RouteContext) -> Result<HandlerReply, AppError>;
}

/// Adapter turning a synchronous closure into an [`IntentHandler`].
pub struct FnHandler<F>(F);

/// Wraps `f` so it can be registered as a handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&str, &RouteContext) -> Result<HandlerReply, AppError> + Send + Sync + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F> IntentHandler for FnHandler<F>
where
    F: Fn(&str, &RouteContext) -> Result<HandlerReply, AppError> + Send + Sync + 'static,
{
    async fn handle(&self, message: &str, context: &RouteContext) -> Result<HandlerReply, AppError> {
        (self.0)(message, context)
    }
}
