//! Test Module
//!
//! Cross-module test suite for the Diriyah Brain core.
//!
//! ## Test Categories
//! - `brain_tests`: Rule precedence, fallback threshold, handler failures, trained model
//! - `access_tests`: Fail-closed checks, category gate, redaction, RBAC config files
//! - `integration_tests`: Chat pipeline, payload narrowing, reload and configuration

pub mod integration_tests;
