//! # Brain Module
//!
//! Intent routing for Diriyah Brain chat messages.
//! Decides which construction service handles a message BEFORE any generative model is called.
//!
//! ## Components
//! - `intent`: Rule patterns and classification results (authoritative fast path)
//! - `statistical`: TF-IDF + logistic regression classifier (fallback)
//! - `handler`: Handler trait and per-request context
//! - `router`: Precedence-ordered dispatch and outcome envelope
//! - `catalog`: Built-in service declarations and training phrases

pub mod catalog;
pub mod handler;
pub mod intent;
pub mod router;
pub mod statistical;

pub use catalog::{default_router, default_training_set, AcknowledgeHandler, ServiceSpec, SERVICES};
pub use handler::{handler_fn, FnHandler, HandlerReply, IntentHandler, RouteContext};
pub use intent::{
    Classification, ClassificationSource, IntentRule, CONFIDENCE_THRESHOLD, GENERAL_INTENT,
};
pub use router::{
    clarification_message, IntentRegistration, IntentRouter, IntentRouterBuilder, RouteOutcome,
    DEFAULT_PRIORITY, HANDLER_FAILED,
};
pub use statistical::{
    IntentPredictor, LabeledPhrase, Prediction, StatisticalClassifier, TfidfVectorizer,
    TrainingOptions,
};
