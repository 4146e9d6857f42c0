//! # Access Module
//!
//! Role-based access control applied to everything the brain returns.
//!
//! ## Components
//! - `roles`: Role profiles, users and the default Diriyah role table
//! - `document`: Category-tagged documents and the record trait used for filtering
//! - `redaction`: Line-granular financial redaction
//! - `policy`: Permission decisions, filtering, topic guard and prompt shaping

pub mod document;
pub mod policy;
pub mod redaction;
pub mod roles;

pub use document::{Document, DocumentRecord};
pub use policy::{
    restriction_message, AccessDecision, AccessPolicy, DenyReason, RbacConfig, RestrictedTopic,
};
pub use redaction::{Redactor, DEFAULT_MARKER};
pub use roles::{default_roles, Action, ProjectScope, Role, RoleTable, User, FULL_ACCESS};
