//! Chat pipeline: restricted-topic guard, intent routing, then RBAC narrowing.

use serde::{Serialize, Serializer};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::access::{restriction_message, AccessPolicy, User};
use crate::brain::{default_router, IntentPredictor, IntentRouter, RouteContext, RouteOutcome, StatisticalClassifier};
use crate::config::CoreConfig;
use crate::error::AppError;
use crate::reload::{Snapshot, Versioned};

/// Reply to one chat message.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    /// The router produced an outcome; handler payloads are already narrowed.
    Routed(RouteOutcome),
    /// The message asked about a category the caller may not see.
    Restricted { category: String, message: String },
}

#[derive(Serialize)]
struct RestrictedEnvelope<'a> {
    handled: bool,
    restricted: &'a str,
    message: &'a str,
}

impl Serialize for ChatReply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ChatReply::Routed(outcome) => outcome.serialize(serializer),
            ChatReply::Restricted { category, message } => RestrictedEnvelope {
                handled: false,
                restricted: category,
                message,
            }
            .serialize(serializer),
        }
    }
}

impl ChatReply {
    pub fn outcome(&self) -> Option<&RouteOutcome> {
        match self {
            ChatReply::Routed(outcome) => Some(outcome),
            ChatReply::Restricted { .. } => None,
        }
    }
}

/// Load the classifier artifact, if configured and present.
pub fn load_classifier(config: &CoreConfig) -> Result<Option<Arc<dyn IntentPredictor>>, AppError> {
    let classifier = StatisticalClassifier::load_optional(config.intent_model.as_deref())?;
    Ok(classifier.map(|c| Arc::new(c) as Arc<dyn IntentPredictor>))
}

pub fn load_access_policy(config: &CoreConfig) -> Result<AccessPolicy, AppError> {
    match &config.rbac_config {
        Some(path) => AccessPolicy::load(path),
        None => {
            info!("No RBAC configuration given, using built-in role table");
            AccessPolicy::builtin()
        }
    }
}

/// Router and access policy published together under one version.
pub struct BrainState {
    router: Arc<IntentRouter>,
    access: Arc<AccessPolicy>,
}

impl BrainState {
    pub fn new(router: IntentRouter, access: AccessPolicy) -> Self {
        Self {
            router: Arc::new(router),
            access: Arc::new(access),
        }
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }
}

/// Shared entry point for chat requests.
///
/// Holds the router and access policy behind one reloadable snapshot; each
/// request works against the pair it loaded when it started.
pub struct BrainCore {
    state: Snapshot<BrainState>,
}

impl BrainCore {
    pub fn new(router: IntentRouter, access: AccessPolicy) -> Self {
        Self {
            state: Snapshot::new(BrainState::new(router, access)),
        }
    }

    /// Build the catalog router and access policy described by `config`.
    pub fn from_config(config: &CoreConfig) -> Result<Self, AppError> {
        let router = default_router(load_classifier(config)?)?;
        let access = load_access_policy(config)?;
        info!(
            intents = router.intents().count(),
            statistical = router.has_classifier(),
            roles = access.roles().len(),
            "Brain core ready"
        );
        Ok(Self::new(router, access))
    }

    pub fn state(&self) -> Versioned<BrainState> {
        self.state.load()
    }

    pub fn version(&self) -> u64 {
        self.state.version()
    }

    pub fn router(&self) -> Arc<IntentRouter> {
        Arc::clone(&self.state.load().router)
    }

    pub fn access(&self) -> Arc<AccessPolicy> {
        Arc::clone(&self.state.load().access)
    }

    /// Replace the router, keeping the current access policy.
    pub fn replace_router(&self, router: IntentRouter) -> u64 {
        let router = Arc::new(router);
        let version = self.state.update(|current| BrainState {
            router: Arc::clone(&router),
            access: Arc::clone(&current.access),
        });
        info!(version, "Intent router replaced");
        version
    }

    /// Replace the access policy, keeping the current router.
    pub fn replace_access(&self, access: AccessPolicy) -> u64 {
        let access = Arc::new(access);
        let version = self.state.update(|current| BrainState {
            router: Arc::clone(&current.router),
            access: Arc::clone(&access),
        });
        info!(version, "Access policy replaced");
        version
    }

    /// Re-read model and RBAC files and publish both as one version.
    ///
    /// Nothing is swapped unless both load.
    pub fn reload(&self, config: &CoreConfig) -> Result<u64, AppError> {
        let router = default_router(load_classifier(config)?)?;
        let access = load_access_policy(config)?;
        let version = self.state.swap(BrainState::new(router, access));
        info!(version, "Brain state reloaded");
        Ok(version)
    }

    pub async fn handle_chat(&self, user: &User, message: &str) -> ChatReply {
        self.handle_chat_with(user, message, RouteContext::for_user(user))
            .await
    }

    #[instrument(skip(self, user, message, context), fields(request_id = %context.request_id, role = %user.role))]
    pub async fn handle_chat_with(&self, user: &User, message: &str, context: RouteContext) -> ChatReply {
        let state = self.state.load();
        let access = state.access();

        if let Some(category) = access.restricted_topic(&user.role, message) {
            warn!(category, "Refusing restricted topic");
            return ChatReply::Restricted {
                category: category.to_string(),
                message: restriction_message(category),
            };
        }

        let outcome = state.router().route(message, &context).await;
        ChatReply::Routed(outcome.map_result(|result| access.narrow_payload(&user.role, result)))
    }

    /// Prompt for a generative model, shaped by the caller's role.
    pub fn role_aware_prompt(&self, user: &User, query: &str) -> String {
        self.access().role_aware_prompt(&user.role, query)
    }
}
