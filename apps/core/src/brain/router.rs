//! Intent Router - dispatches chat messages to registered handlers.
//!
//! Uses a two-tier classification:
//! 1. Rule patterns in precedence order (authoritative, confidence 1.0)
//! 2. Statistical classifier fallback, accepted only above the confidence threshold
//!
//! Anything else is answered with a clarification rather than an error.

use futures::FutureExt;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use super::handler::{HandlerReply, IntentHandler, RouteContext};
use super::intent::{Classification, IntentRule, CONFIDENCE_THRESHOLD};
use super::statistical::{IntentPredictor, Prediction};
use crate::error::AppError;

/// Priority given to registrations that do not name one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Error tag reported when a handler fails.
pub const HANDLER_FAILED: &str = "handler_failed";

/// A declared `(name, priority, patterns, handler)` entry
pub struct IntentRegistration {
    pub name: String,
    /// Lower values are tried first; ties keep declaration order.
    pub priority: i32,
    pub patterns: Vec<String>,
    pub handler: Arc<dyn IntentHandler>,
}

impl IntentRegistration {
    pub fn new<I, S>(name: impl Into<String>, priority: i32, patterns: I, handler: Arc<dyn IntentHandler>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            priority,
            patterns: patterns.into_iter().map(Into::into).collect(),
            handler,
        }
    }
}

/// Terminal result of routing one message
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// A handler served the message.
    Handled {
        classification: Classification,
        result: Value,
    },
    /// No intent was clear enough, or the handler asked for more detail.
    Clarify {
        classification: Classification,
        clarify: String,
    },
    /// The selected handler returned an error or panicked.
    Failed {
        classification: Classification,
        detail: String,
    },
}

impl RouteOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, RouteOutcome::Handled { .. })
    }

    pub fn classification(&self) -> &Classification {
        match self {
            RouteOutcome::Handled { classification, .. }
            | RouteOutcome::Clarify { classification, .. }
            | RouteOutcome::Failed { classification, .. } => classification,
        }
    }

    /// Transform the handler payload, leaving other outcomes untouched.
    pub fn map_result<F>(self, f: F) -> Self
    where
        F: FnOnce(Value) -> Value,
    {
        match self {
            RouteOutcome::Handled {
                classification,
                result,
            } => RouteOutcome::Handled {
                classification,
                result: f(result),
            },
            other => other,
        }
    }
}

/// JSON shape handed to calling layers
#[derive(Serialize)]
struct Envelope<'a> {
    handled: bool,
    intent: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clarify: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
    classification: &'a Classification,
}

impl Serialize for RouteOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let classification = self.classification();
        let mut envelope = Envelope {
            handled: false,
            intent: &classification.intent,
            result: None,
            clarify: None,
            error: None,
            detail: None,
            classification,
        };
        match self {
            RouteOutcome::Handled { result, .. } => {
                envelope.handled = true;
                envelope.result = Some(result);
            }
            RouteOutcome::Clarify { clarify, .. } => envelope.clarify = Some(clarify),
            RouteOutcome::Failed { detail, .. } => {
                envelope.error = Some(HANDLER_FAILED);
                envelope.detail = Some(detail);
            }
        }
        envelope.serialize(serializer)
    }
}

/// Message returned when no intent could be settled.
pub fn clarification_message(closest: Option<&Prediction>) -> String {
    match closest {
        Some(prediction) => format!(
            "No clear intent. Closest: {} ({:.2})",
            prediction.label, prediction.confidence
        ),
        None => "No clear intent. No statistical model available".to_string(),
    }
}

struct RouteEntry {
    rule: IntentRule,
    handler: Arc<dyn IntentHandler>,
}

enum Resolution {
    Matched {
        index: usize,
        classification: Classification,
    },
    Unresolved {
        classification: Classification,
        closest: Option<Prediction>,
    },
}

/// Builder collecting registrations before the router is frozen
#[derive(Default)]
pub struct IntentRouterBuilder {
    registrations: Vec<IntentRegistration>,
    classifier: Option<Arc<dyn IntentPredictor>>,
}

impl IntentRouterBuilder {
    /// Register a handler at [`DEFAULT_PRIORITY`].
    pub fn register<I, S, H>(self, name: &str, patterns: I, handler: H) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        H: IntentHandler,
    {
        self.register_with_priority(name, DEFAULT_PRIORITY, patterns, handler)
    }

    pub fn register_with_priority<I, S, H>(self, name: &str, priority: i32, patterns: I, handler: H) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        H: IntentHandler,
    {
        self.registration(IntentRegistration::new(name, priority, patterns, Arc::new(handler)))
    }

    pub fn registration(mut self, registration: IntentRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Statistical fallback; `None` routes unmatched messages straight to clarification.
    pub fn classifier(mut self, classifier: Option<Arc<dyn IntentPredictor>>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Compile every registration and fix the precedence order.
    pub fn build(self) -> Result<IntentRouter, AppError> {
        let mut names = HashSet::new();
        let mut entries = Vec::with_capacity(self.registrations.len());

        for registration in self.registrations {
            let rule = IntentRule::compile(
                &registration.name,
                registration.priority,
                registration.patterns.as_slice(),
            )?;
            if !names.insert(rule.name().to_string()) {
                return Err(AppError::Registration(format!(
                    "intent `{}` registered twice",
                    rule.name()
                )));
            }
            entries.push(RouteEntry {
                rule,
                handler: registration.handler,
            });
        }

        // Stable: equal priorities keep declaration order.
        entries.sort_by_key(|entry| entry.rule.priority());

        info!(
            "Intent router ready: {} intents, statistical fallback {}",
            entries.len(),
            if self.classifier.is_some() { "enabled" } else { "disabled" }
        );

        Ok(IntentRouter {
            entries,
            classifier: self.classifier,
        })
    }
}

/// Routes free-text messages to exactly one registered handler
pub struct IntentRouter {
    entries: Vec<RouteEntry>,
    classifier: Option<Arc<dyn IntentPredictor>>,
}

impl IntentRouter {
    pub fn builder() -> IntentRouterBuilder {
        IntentRouterBuilder::default()
    }

    /// Intent names in precedence order.
    pub fn intents(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.rule.name())
    }

    pub fn is_registered(&self, intent: &str) -> bool {
        self.position(intent).is_some()
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    fn position(&self, intent: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.rule.name() == intent)
    }

    fn resolve(&self, message: &str) -> Resolution {
        for (index, entry) in self.entries.iter().enumerate() {
            if let Some(pattern) = entry.rule.first_match(message) {
                return Resolution::Matched {
                    index,
                    classification: Classification::rule(entry.rule.name(), pattern.as_str()),
                };
            }
        }

        let closest = self
            .classifier
            .as_ref()
            .and_then(|classifier| classifier.predict(message));

        if let Some(prediction) = &closest {
            if prediction.confidence > CONFIDENCE_THRESHOLD {
                if let Some(index) = self.position(&prediction.label) {
                    return Resolution::Matched {
                        index,
                        classification: Classification::statistical(
                            &prediction.label,
                            prediction.confidence,
                        ),
                    };
                }
            }
        }

        Resolution::Unresolved {
            classification: Classification::fallback(closest.as_ref()),
            closest,
        }
    }

    /// Classify without dispatching.
    pub fn classify(&self, message: &str) -> Classification {
        match self.resolve(message) {
            Resolution::Matched { classification, .. }
            | Resolution::Unresolved { classification, .. } => classification,
        }
    }

    /// Classify `message` and invoke the selected handler.
    ///
    /// Never fails: ambiguity comes back as [`RouteOutcome::Clarify`] and
    /// handler errors or panics as [`RouteOutcome::Failed`].
    #[instrument(skip(self, message, context), fields(request_id = %context.request_id))]
    pub async fn route(&self, message: &str, context: &RouteContext) -> RouteOutcome {
        let (entry, classification) = match self.resolve(message) {
            Resolution::Matched {
                index,
                classification,
            } => (&self.entries[index], classification),
            Resolution::Unresolved {
                classification,
                closest,
            } => {
                let clarify = clarification_message(closest.as_ref());
                debug!("No intent resolved: {}", clarify);
                return RouteOutcome::Clarify {
                    classification,
                    clarify,
                };
            }
        };

        debug!(
            "Dispatching to {} ({}, {:.2})",
            classification.intent, classification.source, classification.confidence
        );

        let call = AssertUnwindSafe(entry.handler.handle(message, context))
            .catch_unwind()
            .await;

        match call {
            Ok(Ok(HandlerReply::Payload(result))) => RouteOutcome::Handled {
                classification,
                result,
            },
            Ok(Ok(HandlerReply::Clarify(clarify))) => RouteOutcome::Clarify {
                classification,
                clarify,
            },
            Ok(Err(err)) => {
                error!("Handler for {} failed: {}", classification.intent, err);
                RouteOutcome::Failed {
                    classification,
                    detail: err.to_string(),
                }
            }
            Err(panic) => {
                let detail = panic_detail(&*panic);
                error!("Handler for {} panicked: {}", classification.intent, detail);
                RouteOutcome::Failed {
                    classification,
                    detail,
                }
            }
        }
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}
