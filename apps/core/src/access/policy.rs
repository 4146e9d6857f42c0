//! Access decisions, document filtering and prompt shaping for one role table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};
use validator::Validate;

use super::document::{Document, DocumentRecord};
use super::redaction::Redactor;
use super::roles::{default_roles, Action, ProjectScope, Role, RoleTable, User, FULL_ACCESS};
use crate::error::AppError;

/// Data-access scopes that see financial content unredacted.
const REDACTION_EXEMPT_SCOPES: &[&str] = &[FULL_ACCESS, "commercial", "financial"];

/// Key of document arrays narrowed inside handler payloads.
const DOCUMENTS_KEY: &str = "documents";

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The role is not in the table. A configuration anomaly, not a policy result.
    UnknownRole,
    UnknownAction,
    ActionNotAllowed,
    DocumentNotAllowed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DenyReason::UnknownRole => "unknown role",
            DenyReason::UnknownAction => "unknown action",
            DenyReason::ActionNotAllowed => "action not allowed",
            DenyReason::DocumentNotAllowed => "document type not allowed",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum AccessDecision {
    Allowed,
    Denied(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}

/// Keywords that mark a message as asking about a document category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedTopic {
    pub category: String,
    pub keywords: Vec<String>,
}

impl RestrictedTopic {
    fn new(category: &str, keywords: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn mentioned_in(&self, lowered_message: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| lowered_message.contains(keyword.as_str()))
    }
}

/// Refusal shown when a message asks about a restricted category.
pub fn restriction_message(category: &str) -> String {
    format!(
        "Sorry, you don't have permission to access {} information. Please contact the Commercial Manager or senior management for this information.",
        category
    )
}

pub fn default_restricted_topics() -> Vec<RestrictedTopic> {
    vec![
        RestrictedTopic::new(
            "quotes",
            &["quote", "quotation", "pricing", "cost", "price", "budget", "financial"],
        ),
        RestrictedTopic::new(
            "commercial",
            &["commercial", "contract value", "payment", "invoice", "profit", "margin"],
        ),
        RestrictedTopic::new(
            "financials",
            &["financial", "budget", "expenditure", "profit", "revenue", "cash flow"],
        ),
        RestrictedTopic::new(
            "contracts",
            &["contract terms", "agreement details", "legal terms", "conditions"],
        ),
    ]
}

pub fn default_category_mapping() -> BTreeMap<String, String> {
    [
        ("boq", "boq"),
        ("schedule", "schedules"),
        ("contract", "contracts"),
        ("rfi", "rfis"),
        ("ncr", "ncrs"),
        ("mom", "moms"),
        ("financial", "financials"),
        ("commercial", "quotes"),
        ("drawings", "technical_drawings"),
        ("photos", "technical_drawings"),
        ("specifications", "boq"),
        ("reports", "moms"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

/// Categories the document analyzer can emit.
pub fn default_analyzer_categories() -> Vec<String> {
    [
        "boq",
        "schedule",
        "schedules",
        "contract",
        "contracts",
        "rfi",
        "rfis",
        "ncr",
        "ncrs",
        "mom",
        "moms",
        "financial",
        "commercial",
        "drawings",
        "photos",
        "specifications",
        "reports",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Serializable RBAC configuration, as stored in the JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RbacConfig {
    #[validate(length(min = 1, message = "at least one role is required"))]
    pub roles: Vec<Role>,
    /// Analyzer category to permission tag; unmapped names map to themselves.
    #[serde(default)]
    pub category_mapping: BTreeMap<String, String>,
    /// Every category the analyzer may emit; each must resolve to a known tag.
    #[serde(default)]
    pub analyzer_categories: Vec<String>,
    #[serde(default)]
    pub redaction: Redactor,
    #[serde(default = "default_restricted_topics")]
    pub restricted_topics: Vec<RestrictedTopic>,
}

impl RbacConfig {
    /// The built-in Diriyah configuration.
    pub fn builtin() -> Self {
        Self {
            roles: default_roles(),
            category_mapping: default_category_mapping(),
            analyzer_categories: default_analyzer_categories(),
            redaction: Redactor::default(),
            restricted_topics: default_restricted_topics(),
        }
    }
}

/// Immutable access policy over one role table.
///
/// Every check fails closed: an unknown role is denied, sees no documents
/// and gets redacted output.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    roles: RoleTable,
    category_mapping: BTreeMap<String, String>,
    redactor: Redactor,
    restricted_topics: Vec<RestrictedTopic>,
}

impl AccessPolicy {
    pub fn builtin() -> Result<Self, AppError> {
        Self::from_config(RbacConfig::builtin())
    }

    /// Validate a configuration and build the policy from it.
    pub fn from_config(config: RbacConfig) -> Result<Self, AppError> {
        config.validate()?;

        let roles = RoleTable::new(config.roles)?;
        let redactor = config.redaction.validated()?;

        let category_mapping: BTreeMap<String, String> = config
            .category_mapping
            .into_iter()
            .map(|(from, to)| (from.to_lowercase(), to))
            .collect();

        for category in &config.analyzer_categories {
            let lowered = category.to_lowercase();
            let tag = category_mapping.get(&lowered).unwrap_or(&lowered);
            if !roles.knows_category(tag) {
                return Err(AppError::Config(format!(
                    "analyzer category `{}` maps to `{}`, which no role lists in allowed_documents",
                    category, tag
                )));
            }
        }

        let restricted_topics = config
            .restricted_topics
            .into_iter()
            .map(|topic| RestrictedTopic {
                category: topic.category,
                keywords: topic
                    .keywords
                    .into_iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();

        Ok(Self {
            roles,
            category_mapping,
            redactor,
            restricted_topics,
        })
    }

    /// Load a JSON RBAC configuration file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let config: RbacConfig = serde_json::from_str(&raw).map_err(|e| {
            AppError::Config(format!("invalid RBAC config {}: {}", path.display(), e))
        })?;
        let policy = Self::from_config(config)?;
        info!(
            path = %path.display(),
            roles = policy.roles.len(),
            "Loaded RBAC configuration"
        );
        Ok(policy)
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    fn known_role(&self, name: &str) -> Option<&Role> {
        let role = self.roles.get(name);
        if role.is_none() {
            warn!(role = %name, "Unknown role in access check; denying");
        }
        role
    }

    /// Structured permission decision.
    ///
    /// An empty `document_type` is treated as absent.
    pub fn decide(&self, role: &str, action: &str, document_type: Option<&str>) -> AccessDecision {
        let Some(profile) = self.known_role(role) else {
            return AccessDecision::Denied(DenyReason::UnknownRole);
        };

        let Ok(action) = action.parse::<Action>() else {
            return AccessDecision::Denied(DenyReason::UnknownAction);
        };

        if !profile.allows_action(action) {
            return AccessDecision::Denied(DenyReason::ActionNotAllowed);
        }

        match document_type.filter(|d| !d.is_empty()) {
            Some(doc) if !profile.has_full_access() && !profile.allows_document(doc) => {
                AccessDecision::Denied(DenyReason::DocumentNotAllowed)
            }
            _ => AccessDecision::Allowed,
        }
    }

    pub fn check_permission(&self, role: &str, action: &str, document_type: Option<&str>) -> bool {
        let decision = self.decide(role, action, document_type);
        if let AccessDecision::Denied(reason) = decision {
            debug!(role = %role, action = %action, document_type = ?document_type, %reason, "Permission denied");
        }
        decision.is_allowed()
    }

    /// Documents the role may see, in input order.
    ///
    /// A document is kept when its lower-cased, mapped category is one of the
    /// role's allowed documents.
    pub fn filter_documents_by_role<D>(&self, role: &str, documents: &[D]) -> Vec<D>
    where
        D: DocumentRecord + Clone,
    {
        let Some(profile) = self.known_role(role) else {
            return Vec::new();
        };

        if profile.has_full_access() {
            return documents.to_vec();
        }

        documents
            .iter()
            .filter(|doc| profile.allows_document(&self.map_category(doc.category())))
            .cloned()
            .collect()
    }

    /// Analyzer category to permission tag.
    pub fn map_category<'a>(&'a self, category: &'a str) -> Cow<'a, str> {
        let lowered = category.to_lowercase();
        match self.category_mapping.get(&lowered) {
            Some(tag) => Cow::Borrowed(tag.as_str()),
            None if lowered == category => Cow::Borrowed(category),
            None => Cow::Owned(lowered),
        }
    }

    /// Whether the role may see documents the analyzer put in `category`.
    pub fn can_access_category(&self, role: &str, category: &str) -> bool {
        let Some(profile) = self.known_role(role) else {
            return false;
        };
        profile.has_full_access() || profile.allows_document(&self.map_category(category))
    }

    pub fn can_access_project(&self, user: &User, project_id: &str) -> bool {
        let Some(profile) = self.known_role(&user.role) else {
            return false;
        };
        match &profile.allowed_projects {
            ProjectScope::All => true,
            ProjectScope::Assigned => user.is_assigned(project_id),
            ProjectScope::Listed(ids) => ids.contains(project_id),
        }
    }

    /// Roles with `all`, `commercial` or `financial` data access see figures.
    pub fn is_redaction_exempt(&self, role: &str) -> bool {
        self.roles.get(role).is_some_and(|profile| {
            REDACTION_EXEMPT_SCOPES
                .iter()
                .any(|scope| profile.has_scope(scope))
        })
    }

    pub fn redact_text<'a>(&self, role: &str, text: &'a str) -> Cow<'a, str> {
        if self.is_redaction_exempt(role) {
            Cow::Borrowed(text)
        } else {
            self.redactor.redact(text)
        }
    }

    pub fn redact_document(&self, role: &str, document: &Document) -> Document {
        if self.is_redaction_exempt(role) {
            document.clone()
        } else {
            self.redactor.redact_document(document)
        }
    }

    /// Narrow a handler payload for the caller.
    ///
    /// Any `documents` array is filtered by category, and every object's
    /// `text_content` and `tables` are redacted for non-exempt roles.
    pub fn narrow_payload(&self, role: &str, payload: Value) -> Value {
        let exempt = self.is_redaction_exempt(role);
        self.narrow_value(role, exempt, payload)
    }

    fn narrow_value(&self, role: &str, exempt: bool, value: Value) -> Value {
        match value {
            Value::Object(mut map) => {
                if let Some(Value::Array(documents)) = map.get(DOCUMENTS_KEY) {
                    let visible = self.filter_documents_by_role(role, documents);
                    map.insert(DOCUMENTS_KEY.to_string(), Value::Array(visible));
                }

                if !exempt {
                    self.redactor.redact_fields(&mut map);
                }

                Value::Object(
                    map.into_iter()
                        .map(|(key, child)| (key, self.narrow_value(role, exempt, child)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.narrow_value(role, exempt, item))
                    .collect(),
            ),
            other => other,
        }
    }

    /// First restricted category the message asks about that the role may not see.
    pub fn restricted_topic(&self, role: &str, message: &str) -> Option<&str> {
        let profile = self.roles.get(role);
        if profile.is_some_and(Role::has_full_access) {
            return None;
        }

        let lowered = message.to_lowercase();
        self.restricted_topics
            .iter()
            .find(|topic| {
                topic.mentioned_in(&lowered)
                    && !profile.is_some_and(|p| p.allows_document(&topic.category))
            })
            .map(|topic| topic.category.as_str())
    }

    /// Prefix a query with the role's restrictions for a generative model.
    ///
    /// Unknown roles get the query back unchanged.
    pub fn role_aware_prompt(&self, role: &str, query: &str) -> String {
        let Some(profile) = self.known_role(role) else {
            return query.to_string();
        };

        let data_access: Vec<&str> = profile.data_access.iter().map(String::as_str).collect();
        let documents: Vec<&str> = profile.allowed_documents.iter().map(String::as_str).collect();
        let actions: Vec<&str> = profile.allowed_actions.iter().map(Action::label).collect();

        format!(
            "\nYou are responding to a {description} in the Diriyah construction project.\n\
             \n\
             IMPORTANT ROLE RESTRICTIONS:\n\
             - User role: {role}\n\
             - Data access level: {data_access}\n\
             - Allowed documents: {documents}\n\
             - Allowed actions: {actions}\n\
             \n\
             RESPONSE GUIDELINES:\n\
             - Only provide information the user is authorized to see\n\
             - If asked about restricted information, politely explain access limitations\n\
             - Focus responses on their area of responsibility\n\
             - Use appropriate technical level for their role\n\
             \n\
             User query: {query}\n",
            description = profile.description,
            role = role.to_uppercase(),
            data_access = data_access.join(", "),
            documents = documents.join(", "),
            actions = actions.join(", "),
            query = query,
        )
    }
}
