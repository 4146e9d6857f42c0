//! Built-in service catalog.
//!
//! Declares every construction service the assistant knows about: its rule
//! patterns, its precedence, and the phrases used to train the statistical
//! fallback. The router is built from this list in one explicit step.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::handler::{HandlerReply, IntentHandler, RouteContext};
use super::router::{IntentRegistration, IntentRouter, DEFAULT_PRIORITY};
use super::statistical::{IntentPredictor, LabeledPhrase};
use crate::error::AppError;

/// Catalog entry for one service
pub struct ServiceSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub priority: i32,
    pub patterns: &'static [&'static str],
    /// Phrases the statistical classifier is trained on; may be empty.
    pub training: &'static [&'static str],
}

/// Workflow commands outrank service keywords ("update cad" is not a takeoff).
const WORKFLOW_PRIORITY: i32 = 10;
/// Merging requests mention cad and boq, so they go ahead of both.
const CONSOLIDATED_PRIORITY: i32 = 50;

pub const SERVICES: &[ServiceSpec] = &[
    ServiceSpec {
        name: "APPROVAL",
        description: "Approve a pending change",
        priority: WORKFLOW_PRIORITY,
        patterns: &[r"\bapprove\b"],
        training: &[],
    },
    ServiceSpec {
        name: "ROLLBACK",
        description: "Roll back a previously applied change",
        priority: WORKFLOW_PRIORITY,
        patterns: &[r"\brollback\b"],
        training: &[],
    },
    ServiceSpec {
        name: "RECALCULATE",
        description: "Recalculate derived quantities",
        priority: WORKFLOW_PRIORITY,
        patterns: &[r"\brecalculate\b"],
        training: &[],
    },
    ServiceSpec {
        name: "VALIDATION",
        description: "Validate project data",
        priority: WORKFLOW_PRIORITY,
        patterns: &[r"\bvalidation\b"],
        training: &[],
    },
    ServiceSpec {
        name: "CAD_UPDATE",
        description: "Apply a CAD drawing update",
        priority: WORKFLOW_PRIORITY,
        patterns: &[r"\bupdate cad\b"],
        training: &[],
    },
    ServiceSpec {
        name: "BOQ_UPDATE",
        description: "Apply a bill of quantities update",
        priority: WORKFLOW_PRIORITY,
        patterns: &[r"\bupdate boq\b"],
        training: &[],
    },
    ServiceSpec {
        name: "consolidated_takeoff",
        description: "Merge CAD takeoff with BOQ quantities",
        priority: CONSOLIDATED_PRIORITY,
        patterns: &[r"\bconsolidated\b"],
        training: &["merge cad and boq", "consolidated quantities"],
    },
    ServiceSpec {
        name: "cad_takeoff",
        description: "Quantity takeoff from CAD drawings",
        priority: DEFAULT_PRIORITY,
        patterns: &[r"\bcad\b", r"\bdxf\b", r"take\s*off"],
        training: &["run cad takeoff", "extract cad quantities", "process dxf"],
    },
    ServiceSpec {
        name: "boq_parser",
        description: "Bill of quantities parsing",
        priority: DEFAULT_PRIORITY,
        patterns: &[r"\bboq\b"],
        training: &["parse boq", "upload boq excel", "read bill of quantities"],
    },
    ServiceSpec {
        name: "primavera",
        description: "Primavera P6 schedule import",
        priority: DEFAULT_PRIORITY,
        patterns: &[r"\bprimavera\b", r"\.xer\b"],
        training: &["import xer", "analyze primavera schedule", "check p6 schedule"],
    },
    ServiceSpec {
        name: "bim",
        description: "BIM / IFC model analysis",
        priority: DEFAULT_PRIORITY,
        patterns: &[r"\bbim\b", r"\bifc\b"],
        training: &["process ifc", "analyze bim model", "bim integration"],
    },
    ServiceSpec {
        name: "aconex",
        description: "Aconex document search",
        priority: DEFAULT_PRIORITY,
        patterns: &[r"\baconex\b"],
        training: &["search aconex", "get aconex docs"],
    },
    ServiceSpec {
        name: "vision",
        description: "Site photo and object detection",
        priority: DEFAULT_PRIORITY,
        patterns: &[r"\byolo\b", r"\bphoto\b", r"\bimage\b"],
        training: &["analyze photo", "yolo detection", "site image check"],
    },
    ServiceSpec {
        name: "analytics_engine",
        description: "Project KPIs and dashboards",
        priority: DEFAULT_PRIORITY,
        patterns: &[r"\banalytics\b", r"\bkpi\b"],
        training: &["project kpi report", "analytics dashboard"],
    },
    ServiceSpec {
        name: "alerts_engine",
        description: "Compliance and schedule alerts",
        priority: DEFAULT_PRIORITY,
        patterns: &[r"\balert\b"],
        training: &["raise alert", "compliance alert"],
    },
    ServiceSpec {
        name: "rag_engine",
        description: "Semantic search over project data",
        priority: DEFAULT_PRIORITY,
        patterns: &[r"\brag\b", r"\bsearch\b", r"\bmemory\b"],
        training: &["semantic search", "query project data"],
    },
];

/// Labeled phrase table for training the statistical fallback.
pub fn default_training_set() -> Vec<LabeledPhrase> {
    SERVICES
        .iter()
        .flat_map(|service| {
            service
                .training
                .iter()
                .map(move |text| LabeledPhrase::new(service.name, *text))
        })
        .collect()
}

/// Handler that accepts a request on behalf of a service.
///
/// Stands in where the real service would call out to an external system.
pub struct AcknowledgeHandler {
    service: &'static str,
    description: &'static str,
}

impl AcknowledgeHandler {
    pub fn new(spec: &ServiceSpec) -> Self {
        Self {
            service: spec.name,
            description: spec.description,
        }
    }
}

#[async_trait]
impl IntentHandler for AcknowledgeHandler {
    async fn handle(&self, message: &str, context: &RouteContext) -> Result<HandlerReply, AppError> {
        Ok(HandlerReply::Payload(json!({
            "service": self.service,
            "status": "accepted",
            "description": self.description,
            "result": format!("Handled by {}", self.service),
            "request": message,
            "request_id": context.request_id.to_string(),
        })))
    }
}

/// Registrations for every catalog service, in declaration order.
pub fn default_registrations() -> Vec<IntentRegistration> {
    SERVICES
        .iter()
        .map(|spec| {
            IntentRegistration::new(
                spec.name,
                spec.priority,
                spec.patterns.iter().copied(),
                Arc::new(AcknowledgeHandler::new(spec)),
            )
        })
        .collect()
}

/// Router over the whole catalog.
pub fn default_router(classifier: Option<Arc<dyn IntentPredictor>>) -> Result<IntentRouter, AppError> {
    default_registrations()
        .into_iter()
        .fold(IntentRouter::builder(), |builder, registration| {
            builder.registration(registration)
        })
        .classifier(classifier)
        .build()
}
