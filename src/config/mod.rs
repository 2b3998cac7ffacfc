use std::env;
use std::fmt;

use crate::compliance::{ComplianceCategory, CompliancePolicy};

/// Distinguishes runtime behavior for different stages of the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub policy: CompliancePolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            policy: load_policy()?,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

fn load_policy() -> Result<CompliancePolicy, ConfigError> {
    let mut policy = CompliancePolicy::default();

    if let Some(threshold) = parse_var::<f32>("COMPLIANCE_WARNING_THRESHOLD")? {
        policy = policy.with_warning_threshold(threshold);
    }
    if let Some(hours) = parse_var::<i64>("COMPLIANCE_ESCALATION_GRACE_HOURS")? {
        policy = policy.with_escalation_grace_hours(hours);
    }
    if let Some(hours) = parse_var::<i64>("COMPLIANCE_READINESS_WINDOW_HOURS")? {
        policy = policy.with_readiness_window_hours(hours);
    }
    if let Some(cap) = parse_var::<u8>("COMPLIANCE_QUALITY_CAP")? {
        policy = policy.with_quality_cap(cap);
    }
    if let Some(days) = parse_var::<i64>("COMPLIANCE_SUBMISSION_LAG_DAYS")? {
        policy = policy.with_submission_lag_days(days);
    }
    if let Ok(raw) = env::var("COMPLIANCE_AREA_WEIGHTS") {
        for (category, weight) in parse_area_weights(&raw)? {
            policy = policy.with_area_weight(category, weight);
        }
    }

    Ok(policy)
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        _ => Ok(None),
    }
}

/// Parse `category=weight` pairs separated by commas, e.g. `academic=2,workplace-safety=1.5`.
pub fn parse_area_weights(raw: &str) -> Result<Vec<(ComplianceCategory, f32)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let invalid = || ConfigError::InvalidAreaWeight {
                entry: pair.to_string(),
            };
            let (key, value) = pair.split_once('=').ok_or_else(invalid)?;
            let category = ComplianceCategory::parse(key).ok_or_else(invalid)?;
            let weight = value.trim().parse::<f32>().map_err(|_| invalid())?;
            if !weight.is_finite() || weight <= 0.0 {
                return Err(invalid());
            }
            Ok((category, weight))
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber { name: &'static str, value: String },
    InvalidAreaWeight { entry: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be numeric (got '{value}')")
            }
            ConfigError::InvalidAreaWeight { entry } => write!(
                f,
                "COMPLIANCE_AREA_WEIGHTS entry '{entry}' must look like category=positive-number"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_LOG_LEVEL",
            "COMPLIANCE_WARNING_THRESHOLD",
            "COMPLIANCE_ESCALATION_GRACE_HOURS",
            "COMPLIANCE_READINESS_WINDOW_HOURS",
            "COMPLIANCE_QUALITY_CAP",
            "COMPLIANCE_SUBMISSION_LAG_DAYS",
            "COMPLIANCE_AREA_WEIGHTS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.policy, CompliancePolicy::default());
        assert_eq!(config.policy.warning_threshold(), 70.0);
        assert_eq!(config.policy.escalation_grace(), chrono::Duration::hours(48));
    }

    #[test]
    fn reads_policy_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "prod");
        env::set_var("COMPLIANCE_WARNING_THRESHOLD", "80");
        env::set_var("COMPLIANCE_READINESS_WINDOW_HOURS", "72");
        env::set_var("COMPLIANCE_AREA_WEIGHTS", "academic=2, workplace_safety=1.5");

        let config = AppConfig::load().expect("config loads");
        reset_env();

        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(config.policy.warning_threshold(), 80.0);
        assert_eq!(config.policy.readiness_window(), chrono::Duration::hours(72));
        assert_eq!(config.policy.area_weight(ComplianceCategory::Academic), 2.0);
        assert_eq!(
            config.policy.area_weight(ComplianceCategory::WorkplaceSafety),
            1.5
        );
        assert_eq!(config.policy.area_weight(ComplianceCategory::Conduct), 1.0);
    }

    #[test]
    fn rejects_malformed_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("COMPLIANCE_QUALITY_CAP", "seventy");
        let error = AppConfig::load().expect_err("non-numeric cap fails");
        reset_env();
        assert!(matches!(
            error,
            ConfigError::InvalidNumber {
                name: "COMPLIANCE_QUALITY_CAP",
                ..
            }
        ));

        assert!(parse_area_weights("academic").is_err());
        assert!(parse_area_weights("astronomy=2").is_err());
        assert!(parse_area_weights("conduct=-1").is_err());
    }
}
