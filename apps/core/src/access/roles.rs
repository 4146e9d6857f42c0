use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Data-access scope granting unrestricted visibility.
pub const FULL_ACCESS: &str = "all";

/// Something a role may do to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Edit,
    Delete,
    Approve,
    Export,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Export => "export",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "view" => Ok(Action::View),
            "edit" => Ok(Action::Edit),
            "delete" => Ok(Action::Delete),
            "approve" => Ok(Action::Approve),
            "export" => Ok(Action::Export),
            other => Err(AppError::Validation(format!("unknown action `{}`", other))),
        }
    }
}

/// Which projects a role may see.
///
/// Serialized the way role tables write it: `["all"]`, `["assigned"]`, or a list of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum ProjectScope {
    /// Every project.
    All,
    /// Only the projects assigned to the individual user.
    Assigned,
    /// A fixed set of project ids.
    Listed(BTreeSet<String>),
}

impl From<Vec<String>> for ProjectScope {
    fn from(entries: Vec<String>) -> Self {
        if entries.iter().any(|e| e == FULL_ACCESS) {
            ProjectScope::All
        } else if entries.iter().any(|e| e == "assigned") {
            ProjectScope::Assigned
        } else {
            ProjectScope::Listed(entries.into_iter().collect())
        }
    }
}

impl From<ProjectScope> for Vec<String> {
    fn from(scope: ProjectScope) -> Self {
        match scope {
            ProjectScope::All => vec![FULL_ACCESS.to_string()],
            ProjectScope::Assigned => vec!["assigned".to_string()],
            ProjectScope::Listed(ids) => ids.into_iter().collect(),
        }
    }
}

/// A named permission profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Scope tags such as `all`, `financial`, `operational`.
    pub data_access: BTreeSet<String>,
    /// Document category tags the role may see.
    #[serde(alias = "documents")]
    pub allowed_documents: BTreeSet<String>,
    #[serde(alias = "actions")]
    pub allowed_actions: BTreeSet<Action>,
    #[serde(alias = "projects")]
    pub allowed_projects: ProjectScope,
}

impl Role {
    /// Roles with `all` data access bypass category filtering.
    pub fn has_full_access(&self) -> bool {
        self.data_access.contains(FULL_ACCESS)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.data_access.contains(scope)
    }

    pub fn allows_action(&self, action: Action) -> bool {
        self.allowed_actions.contains(&action)
    }

    pub fn allows_document(&self, category: &str) -> bool {
        self.allowed_documents.contains(category)
    }
}

/// An authenticated caller, as resolved by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub identity: String,
    pub role: String,
    /// Projects assigned to this user; `all` grants every project.
    #[serde(default)]
    pub projects: Vec<String>,
}

impl User {
    pub fn new(identity: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role: role.into(),
            projects: Vec::new(),
        }
    }

    pub fn with_projects<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projects = projects.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_assigned(&self, project_id: &str) -> bool {
        self.projects
            .iter()
            .any(|p| p == project_id || p == FULL_ACCESS)
    }
}

/// Static, process-wide role table keyed by role name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleTable {
    roles: BTreeMap<String, Role>,
}

impl RoleTable {
    /// Build a table, rejecting blank or duplicate role names.
    pub fn new(roles: Vec<Role>) -> Result<Self, AppError> {
        let mut table = BTreeMap::new();
        for role in roles {
            if role.name.trim().is_empty() {
                return Err(AppError::Config("role name must not be empty".to_string()));
            }
            if table.contains_key(&role.name) {
                return Err(AppError::Config(format!(
                    "role `{}` defined twice",
                    role.name
                )));
            }
            table.insert(role.name.clone(), role);
        }
        Ok(Self { roles: table })
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// True if any role lists `category` among its allowed documents.
    pub fn knows_category(&self, category: &str) -> bool {
        self.roles.values().any(|role| role.allows_document(category))
    }
}

fn role(
    name: &str,
    description: &str,
    data_access: &[&str],
    documents: &[&str],
    actions: &[Action],
    projects: ProjectScope,
) -> Role {
    Role {
        name: name.to_string(),
        description: description.to_string(),
        data_access: data_access.iter().map(|s| s.to_string()).collect(),
        allowed_documents: documents.iter().map(|s| s.to_string()).collect(),
        allowed_actions: actions.iter().copied().collect(),
        allowed_projects: projects,
    }
}

/// The built-in Diriyah role profiles.
pub fn default_roles() -> Vec<Role> {
    use Action::*;

    vec![
        role(
            "ceo",
            "Chief Executive Officer - Full access to all data and operations",
            &["all"],
            &[
                "boq", "schedules", "contracts", "financials", "insurances", "rfis", "moms",
                "ncrs", "quotes", "commercial",
            ],
            &[View, Edit, Delete, Approve, Export],
            ProjectScope::All,
        ),
        role(
            "director",
            "Director - Strategic oversight and financial access",
            &["strategic", "operational", "financial"],
            &[
                "boq", "schedules", "contracts", "financials", "insurances", "rfis", "moms",
                "ncrs",
            ],
            &[View, Edit, Approve, Export],
            ProjectScope::All,
        ),
        role(
            "project_manager",
            "Project Manager - Operational and technical project data",
            &["operational", "technical"],
            &["boq", "schedules", "rfis", "moms", "ncrs", "technical_drawings"],
            &[View, Edit, Export],
            ProjectScope::Assigned,
        ),
        role(
            "site_manager",
            "Site Manager - On-site operations and technical data only",
            &["operational", "technical"],
            &["schedules", "rfis", "moms", "ncrs", "technical_drawings", "safety_reports"],
            &[View, Edit],
            ProjectScope::Assigned,
        ),
        role(
            "engineer",
            "Engineer - Technical documentation and specifications",
            &["technical"],
            &["boq", "schedules", "technical_drawings", "rfis", "ncrs"],
            &[View, Edit],
            ProjectScope::Assigned,
        ),
        role(
            "commercial_manager",
            "Commercial Manager - Financial and contractual matters",
            &["commercial", "financial"],
            &["contracts", "quotes", "financials", "insurances", "variations"],
            &[View, Edit, Approve],
            ProjectScope::Assigned,
        ),
        role(
            "safety_officer",
            "Safety Officer - Safety compliance and reporting",
            &["safety", "operational"],
            &["safety_reports", "ncrs", "moms", "schedules"],
            &[View, Edit],
            ProjectScope::Assigned,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!("View".parse::<Action>().unwrap(), Action::View);
        assert_eq!(" export ".parse::<Action>().unwrap(), Action::Export);
        assert!("publish".parse::<Action>().is_err());
    }

    #[test]
    fn test_project_scope_round_trips_through_lists() {
        let all: ProjectScope = vec!["all".to_string()].into();
        assert_eq!(all, ProjectScope::All);

        let assigned: ProjectScope = vec!["assigned".to_string()].into();
        assert_eq!(assigned, ProjectScope::Assigned);

        let listed: ProjectScope = serde_json::from_str(r#"["heritage_resort","cultural_district"]"#).unwrap();
        match &listed {
            ProjectScope::Listed(ids) => assert!(ids.contains("heritage_resort")),
            other => panic!("unexpected scope {:?}", other),
        }
        let json = serde_json::to_string(&listed).unwrap();
        assert_eq!(json, r#"["cultural_district","heritage_resort"]"#);
    }

    #[test]
    fn test_role_accepts_short_field_names() {
        let json = r#"{
            "name": "planner",
            "data_access": ["operational"],
            "documents": ["schedules"],
            "actions": ["view"],
            "projects": ["assigned"]
        }"#;
        let role: Role = serde_json::from_str(json).unwrap();
        assert!(role.allows_document("schedules"));
        assert!(role.allows_action(Action::View));
        assert!(!role.has_full_access());
        assert_eq!(role.allowed_projects, ProjectScope::Assigned);
    }

    #[test]
    fn test_default_table_has_seven_roles() {
        let table = RoleTable::new(default_roles()).unwrap();
        assert_eq!(table.len(), 7);
        assert!(table.get("ceo").unwrap().has_full_access());
        assert!(!table.get("director").unwrap().has_full_access());
        assert!(table.knows_category("safety_reports"));
        assert!(!table.knows_category("photos"));
    }

    #[test]
    fn test_duplicate_roles_are_rejected() {
        let mut roles = default_roles();
        roles.push(roles[0].clone());
        assert!(matches!(RoleTable::new(roles), Err(AppError::Config(_))));
    }

    #[test]
    fn test_user_assignment() {
        let user = User::new("sara.director@diriyah.sa", "director")
            .with_projects(["heritage_resort", "boulevard_development"]);
        assert!(user.is_assigned("heritage_resort"));
        assert!(!user.is_assigned("cultural_district"));

        let everywhere = User::new("ahmed.ceo@diriyah.sa", "ceo").with_projects(["all"]);
        assert!(everywhere.is_assigned("cultural_district"));
    }
}
