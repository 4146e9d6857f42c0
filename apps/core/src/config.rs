use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;
use validator::Validate;

use crate::error::AppError;

pub const ENV_INTENT_MODEL: &str = "DIRIYAH_INTENT_MODEL";
pub const ENV_RBAC_CONFIG: &str = "DIRIYAH_RBAC_CONFIG";
pub const ENV_LOG_FORMAT: &str = "DIRIYAH_LOG_FORMAT";
pub const ENV_SERVICE_NAME: &str = "DIRIYAH_SERVICE_NAME";

const DEFAULT_SERVICE_NAME: &str = "diriyah-brain";

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// Bunyan-style JSON records.
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" | "bunyan" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!(
                "{} must be `pretty` or `json`, got `{}`",
                ENV_LOG_FORMAT, other
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Runtime configuration of the brain core.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct CoreConfig {
    /// Trained classifier artifact. Routing runs rules-only without it.
    pub intent_model: Option<PathBuf>,
    /// RBAC configuration file. The built-in role table is used without it.
    pub rbac_config: Option<PathBuf>,
    pub log_format: LogFormat,
    #[validate(length(min = 1, message = "service name must not be empty"))]
    pub service_name: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            intent_model: None,
            rbac_config: None,
            log_format: LogFormat::default(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

/// Unset and blank variables are both treated as absent.
fn read_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl CoreConfig {
    /// Load `.env` (if any), then read the process environment.
    pub fn load() -> Result<Self, AppError> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_env()
    }

    /// Read configuration from the process environment only.
    pub fn from_env() -> Result<Self, AppError> {
        let log_format = match read_var(ENV_LOG_FORMAT) {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        let config = Self {
            intent_model: read_var(ENV_INTENT_MODEL).map(PathBuf::from),
            rbac_config: read_var(ENV_RBAC_CONFIG).map(PathBuf::from),
            log_format,
            service_name: env::var(ENV_SERVICE_NAME)
                .map(|name| name.trim().to_string())
                .unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string()),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!("xml".parse::<LogFormat>(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_defaults_without_environment() {
        temp_env::with_vars_unset(
            [ENV_INTENT_MODEL, ENV_RBAC_CONFIG, ENV_LOG_FORMAT, ENV_SERVICE_NAME],
            || {
                let config = CoreConfig::from_env().unwrap();
                assert_eq!(config, CoreConfig::default());
            },
        );
    }

    #[test]
    fn test_environment_overrides() {
        temp_env::with_vars(
            [
                (ENV_INTENT_MODEL, Some("/var/lib/diriyah/intent.json")),
                (ENV_RBAC_CONFIG, Some("  ")),
                (ENV_LOG_FORMAT, Some("json")),
                (ENV_SERVICE_NAME, Some("brain-staging")),
            ],
            || {
                let config = CoreConfig::from_env().unwrap();
                assert_eq!(
                    config.intent_model,
                    Some(PathBuf::from("/var/lib/diriyah/intent.json"))
                );
                assert_eq!(config.rbac_config, None);
                assert_eq!(config.log_format, LogFormat::Json);
                assert_eq!(config.service_name, "brain-staging");
            },
        );
    }

    #[test]
    fn test_blank_service_name_fails_validation() {
        temp_env::with_var(ENV_SERVICE_NAME, Some("   "), || {
            assert!(matches!(
                CoreConfig::from_env(),
                Err(AppError::Validation(_))
            ));
        });
    }
}
