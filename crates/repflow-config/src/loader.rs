// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./repflow.toml` > `~/.config/repflow/repflow.toml`
//! > `/etc/repflow/repflow.toml` with environment variable overrides via the
//! `REPFLOW_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RepflowConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/repflow/repflow.toml` (system-wide)
/// 3. `~/.config/repflow/repflow.toml` (user XDG config)
/// 4. `./repflow.toml` (local directory)
/// 5. `REPFLOW_*` environment variables
pub fn load_config() -> Result<RepflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RepflowConfig::default()))
        .merge(Toml::file("/etc/repflow/repflow.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("repflow/repflow.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("repflow.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<RepflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RepflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RepflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RepflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `REPFLOW_WORKFLOW_MAX_ATTEMPTS` must
/// map to `workflow.max_attempts`, not `workflow.max.attempts`.
fn env_provider() -> Env {
    Env::prefixed("REPFLOW_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: REPFLOW_WORKFLOW_MAX_ATTEMPTS -> "workflow_max_attempts"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("workflow_", "workflow.", 1)
            .replacen("trigger_", "trigger.", 1)
            .replacen("search_", "search.", 1)
            .replacen("anthropic_", "anthropic.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}
