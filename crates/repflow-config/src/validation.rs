// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as score thresholds on the 1-5 scale and non-zero
//! attempt budgets.

use thiserror::Error;

use crate::model::RepflowConfig;

/// A single configuration validation failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &RepflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.workflow.max_attempts == 0 {
        errors.push(ConfigError::new(
            "workflow.max_attempts must be at least 1",
        ));
    }

    if !(1..=5).contains(&config.workflow.eval_min_score) {
        errors.push(ConfigError::new(format!(
            "workflow.eval_min_score must be in 1..=5, got {}",
            config.workflow.eval_min_score
        )));
    }

    if config.workflow.overall_run_deadline_ms == 0 {
        errors.push(ConfigError::new(
            "workflow.overall_run_deadline_ms must be positive",
        ));
    }

    if config.search.top_k == 0 {
        errors.push(ConfigError::new("search.top_k must be at least 1"));
    }

    if config.search.snippet_byte_budget == 0 {
        errors.push(ConfigError::new(
            "search.snippet_byte_budget must be positive",
        ));
    }

    if config.trigger.phrases.is_empty() {
        errors.push(ConfigError::new(
            "trigger.phrases must contain at least one phrase",
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::new("storage.database_path must not be empty"));
    }

    if config.gateway.host.trim().is_empty() {
        errors.push(ConfigError::new("gateway.host must not be empty"));
    } else {
        let host = config.gateway.host.trim();
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::new(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if config.search.mygps_api_url.is_some()
        && config
            .search
            .mygps_api_url
            .as_deref()
            .is_some_and(|u| !u.starts_with("http"))
    {
        errors.push(ConfigError::new(
            "search.mygps_api_url must be an http(s) URL",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = RepflowConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_max_attempts_rejected() {
        let mut config = RepflowConfig::default();
        config.workflow.max_attempts = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("max_attempts")));
    }

    #[test]
    fn out_of_range_min_score_rejected() {
        let mut config = RepflowConfig::default();
        config.workflow.eval_min_score = 6;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("eval_min_score")));

        config.workflow.eval_min_score = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("eval_min_score")));
    }

    #[test]
    fn empty_trigger_phrases_rejected() {
        let mut config = RepflowConfig::default();
        config.trigger.phrases.clear();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("trigger.phrases")));
    }

    #[test]
    fn multiple_errors_collected() {
        let mut config = RepflowConfig::default();
        config.workflow.max_attempts = 0;
        config.search.top_k = 0;
        config.storage.database_path = "  ".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn non_http_mygps_url_rejected() {
        let mut config = RepflowConfig::default();
        config.search.mygps_api_url = Some("ftp://internal".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("mygps_api_url")));
    }
}
