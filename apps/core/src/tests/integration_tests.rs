//! Integration Tests
//!
//! The full chat pipeline: topic guard, routing, payload narrowing,
//! configuration loading and hot reload under concurrent use.

use crate::access::{AccessPolicy, RbacConfig, User};
use crate::brain::{
    default_router, default_training_set, handler_fn, HandlerReply, IntentRouter, RouteOutcome,
    StatisticalClassifier, TrainingOptions,
};
use crate::config::CoreConfig;
use crate::error::AppError;
use crate::pipeline::{BrainCore, ChatReply};
use serde_json::json;
use std::fs;
use std::sync::Arc;

fn core() -> BrainCore {
    BrainCore::new(default_router(None).unwrap(), AccessPolicy::builtin().unwrap())
}

fn engineer() -> User {
    User::new("omar.engineer@diriyah.sa", "engineer").with_projects(["heritage_resort"])
}

#[cfg(test)]
mod chat_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_service_request_is_routed() {
        let reply = core().handle_chat(&engineer(), "run cad takeoff for block A").await;

        match reply.outcome() {
            Some(RouteOutcome::Handled { classification, result }) => {
                assert_eq!(classification.intent, "cad_takeoff");
                assert_eq!(result["service"], "cad_takeoff");
                assert_eq!(result["status"], "accepted");
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_restricted_topic_is_refused_before_routing() {
        let reply = core()
            .handle_chat(&engineer(), "What is the cost of the BOQ items?")
            .await;

        assert!(matches!(&reply, ChatReply::Restricted { category, .. } if category == "quotes"));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["handled"], false);
        assert_eq!(json["restricted"], "quotes");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("Sorry, you don't have permission to access quotes information."));
    }

    #[tokio::test]
    async fn test_full_access_role_is_routed_instead() {
        let ceo = User::new("ahmed.ceo@diriyah.sa", "ceo");
        let reply = core().handle_chat(&ceo, "What is the cost of the BOQ items?").await;

        let outcome = reply.outcome().unwrap();
        assert_eq!(outcome.classification().intent, "boq_parser");
    }

    #[tokio::test]
    async fn test_unclear_message_without_model() {
        let reply = core().handle_chat(&engineer(), "good morning team").await;

        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["handled"], false);
        assert_eq!(json["clarify"], "No clear intent. No statistical model available");
        assert_eq!(json["classification"]["source"], "fallback");
    }

    #[tokio::test]
    async fn test_handler_payload_is_narrowed_for_caller() {
        let router = IntentRouter::builder()
            .register(
                "rag_engine",
                [r"\bsearch\b"],
                handler_fn(|_m, _c| {
                    Ok(HandlerReply::Payload(json!({
                        "documents": [
                            {"type": "ncrs", "text_content": "NCR-31 honeycombing\nBack-charge invoice to follow"},
                            {"type": "contracts", "text_content": "Clause 14"},
                        ]
                    })))
                }),
            )
            .build()
            .unwrap();
        let core = BrainCore::new(router, AccessPolicy::builtin().unwrap());

        let site = User::new("khalid.site@diriyah.sa", "site_manager");
        let reply = core.handle_chat(&site, "search ncr register").await;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            json["result"]["documents"],
            json!([{
                "type": "ncrs",
                "text_content": "NCR-31 honeycombing\n[FINANCIAL INFORMATION REDACTED]"
            }])
        );

        let director = User::new("sara.director@diriyah.sa", "director");
        let reply = core.handle_chat(&director, "search ncr register").await;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["result"]["documents"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            json["result"]["documents"][0]["text_content"],
            "NCR-31 honeycombing\nBack-charge invoice to follow"
        );
    }

    #[test]
    fn test_role_aware_prompt_through_core() {
        let prompt = core().role_aware_prompt(&engineer(), "List open NCRs");
        assert!(prompt.contains("- User role: ENGINEER"));
        assert!(prompt.contains("User query: List open NCRs"));
    }
}

#[cfg(test)]
mod reload_tests {
    use super::*;

    fn policy_without_engineer_boq() -> AccessPolicy {
        let mut config = RbacConfig::builtin();
        for role in config.roles.iter_mut().filter(|r| r.name == "engineer") {
            role.allowed_documents.remove("boq");
        }
        AccessPolicy::from_config(config).unwrap()
    }

    #[test]
    fn test_in_flight_snapshot_survives_swap() {
        let core = core();
        let before = core.state();
        assert_eq!(before.version, 1);

        let version = core.replace_access(policy_without_engineer_boq());
        assert_eq!(version, 2);

        assert!(before.access().check_permission("engineer", "view", Some("boq")));
        assert!(!core.access().check_permission("engineer", "view", Some("boq")));
    }

    #[test]
    fn test_router_and_policy_share_one_version() {
        let core = core();
        let before = core.state();

        let version = core.replace_router(IntentRouter::builder().build().unwrap());
        assert_eq!(version, 2);
        assert_eq!(core.version(), 2);

        let after = core.state();
        assert!(std::ptr::eq(after.access(), before.access()));
        assert!(!std::ptr::eq(after.router(), before.router()));
        assert_eq!(before.router().classify("upload boq").intent, "boq_parser");
        assert_ne!(after.router().classify("upload boq").intent, "boq_parser");
    }

    #[tokio::test]
    async fn test_concurrent_replacements_keep_both_halves() {
        let core = Arc::new(core());

        let router_task = {
            let core = Arc::clone(&core);
            tokio::spawn(async move { core.replace_router(IntentRouter::builder().build().unwrap()) })
        };
        let access_task = {
            let core = Arc::clone(&core);
            tokio::spawn(async move { core.replace_access(policy_without_engineer_boq()) })
        };
        router_task.await.unwrap();
        access_task.await.unwrap();

        let state = core.state();
        assert_eq!(state.version, 3);
        assert_eq!(state.router().intents().count(), 0);
        assert!(!state.access().check_permission("engineer", "view", Some("boq")));
    }

    #[test]
    fn test_reload_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("intent_model.json");
        let rbac_path = dir.path().join("rbac.json");

        StatisticalClassifier::train(&default_training_set(), &TrainingOptions::default())
            .unwrap()
            .save(&model_path)
            .unwrap();
        fs::write(&rbac_path, serde_json::to_string(&RbacConfig::builtin()).unwrap()).unwrap();

        let config = CoreConfig {
            intent_model: Some(model_path),
            rbac_config: Some(rbac_path),
            ..CoreConfig::default()
        };

        let core = BrainCore::from_config(&config).unwrap();
        assert!(core.router().has_classifier());

        assert_eq!(core.reload(&config).unwrap(), 2);
        assert_eq!(core.version(), 2);
        assert!(core.router().has_classifier());
    }

    #[test]
    fn test_failed_reload_keeps_current_config() {
        let dir = tempfile::tempdir().unwrap();
        let rbac_path = dir.path().join("rbac.json");
        fs::write(&rbac_path, "not json").unwrap();

        let core = core();
        let broken = CoreConfig {
            rbac_config: Some(rbac_path),
            ..CoreConfig::default()
        };

        assert!(matches!(core.reload(&broken), Err(AppError::Config(_))));
        assert_eq!(core.version(), 1);
    }

    #[test]
    fn test_corrupt_model_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("intent_model.json");
        fs::write(&model_path, "{}").unwrap();

        let config = CoreConfig {
            intent_model: Some(model_path),
            ..CoreConfig::default()
        };
        assert!(matches!(BrainCore::from_config(&config), Err(AppError::Config(_))));
    }

    #[test]
    fn test_missing_model_runs_rules_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig {
            intent_model: Some(dir.path().join("not_trained_yet.json")),
            ..CoreConfig::default()
        };
        let core = BrainCore::from_config(&config).unwrap();
        assert!(!core.router().has_classifier());
    }

    #[tokio::test]
    async fn test_concurrent_chats_during_swaps() {
        let core = Arc::new(core());
        let mut tasks = Vec::new();

        for i in 0..16 {
            let core = Arc::clone(&core);
            tasks.push(tokio::spawn(async move {
                if i % 4 == 0 {
                    core.replace_router(default_router(None).unwrap());
                }
                let reply = core.handle_chat(&engineer(), "upload boq for tower 2").await;
                reply.outcome().map(|o| o.classification().intent.clone())
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().as_deref(), Some("boq_parser"));
        }
        assert_eq!(core.version(), 5);
    }
}

#[cfg(test)]
mod config_env_tests {
    use super::*;
    use crate::config::{ENV_INTENT_MODEL, ENV_LOG_FORMAT, ENV_RBAC_CONFIG, ENV_SERVICE_NAME};

    #[test]
    fn test_core_builds_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("intent_model.json");
        StatisticalClassifier::train(&default_training_set(), &TrainingOptions::default())
            .unwrap()
            .save(&model_path)
            .unwrap();

        temp_env::with_vars(
            [
                (ENV_INTENT_MODEL, Some(model_path.to_string_lossy().to_string())),
                (ENV_RBAC_CONFIG, None),
                (ENV_LOG_FORMAT, Some("json".to_string())),
                (ENV_SERVICE_NAME, None),
            ],
            || {
                let config = CoreConfig::from_env().unwrap();
                let core = BrainCore::from_config(&config).unwrap();
                assert!(core.router().has_classifier());
                assert_eq!(core.access().roles().len(), 7);
            },
        );
    }
}
