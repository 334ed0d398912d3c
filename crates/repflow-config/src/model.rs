// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Repflow orchestrator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Repflow configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepflowConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Workflow engine retry and deadline settings.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Trigger phrase settings.
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Search fan-out and source adapter settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Anthropic API settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP/WebSocket gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the service.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "repflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Workflow engine configuration: retry budget, pass threshold, deadlines.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Maximum attempts per run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Minimum per-criterion evaluation score for a pass (1-5 scale).
    #[serde(default = "default_eval_min_score")]
    pub eval_min_score: u8,

    /// Whether the generator requires at least one source result.
    #[serde(default = "default_require_grounding")]
    pub require_grounding: bool,

    /// Overall run deadline in milliseconds.
    #[serde(default = "default_overall_run_deadline_ms")]
    pub overall_run_deadline_ms: u64,

    /// Query formulation stage deadline in milliseconds.
    #[serde(default = "default_query_deadline_ms")]
    pub query_deadline_ms: u64,

    /// Resolution generation stage deadline in milliseconds.
    #[serde(default = "default_generate_deadline_ms")]
    pub generate_deadline_ms: u64,

    /// Evaluation stage deadline in milliseconds.
    #[serde(default = "default_evaluate_deadline_ms")]
    pub evaluate_deadline_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            eval_min_score: default_eval_min_score(),
            require_grounding: default_require_grounding(),
            overall_run_deadline_ms: default_overall_run_deadline_ms(),
            query_deadline_ms: default_query_deadline_ms(),
            generate_deadline_ms: default_generate_deadline_ms(),
            evaluate_deadline_ms: default_evaluate_deadline_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_eval_min_score() -> u8 {
    3
}

fn default_require_grounding() -> bool {
    true
}

fn default_overall_run_deadline_ms() -> u64 {
    90_000
}

fn default_query_deadline_ms() -> u64 {
    15_000
}

fn default_generate_deadline_ms() -> u64 {
    30_000
}

fn default_evaluate_deadline_ms() -> u64 {
    20_000
}

/// Trigger phrase configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    /// Activation phrases matched case-insensitively against the most
    /// recent representative message.
    #[serde(default = "default_trigger_phrases")]
    pub phrases: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            phrases: default_trigger_phrases(),
        }
    }
}

fn default_trigger_phrases() -> Vec<String> {
    [
        "let me take a look",
        "let me check",
        "i'll look into",
        "i'll check that",
        "looking into",
        "checking that for you",
        "one moment please",
        "give me a moment",
        "let me find that",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Search fan-out and source adapter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Per-source result cap.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Fan-out deadline in milliseconds.
    #[serde(default = "default_search_deadline_ms")]
    pub deadline_ms: u64,

    /// Per-source snippet truncation budget in bytes.
    #[serde(default = "default_snippet_byte_budget")]
    pub snippet_byte_budget: usize,

    /// Base URL of the public web source.
    #[serde(default = "default_fidelity_base_url")]
    pub fidelity_base_url: String,

    /// Internal knowledge API base URL. `None` disables the source.
    #[serde(default)]
    pub mygps_api_url: Option<String>,

    /// Internal knowledge API key. Absent credentials surface as an
    /// `unauthorized` per-source error, never a workflow failure.
    #[serde(default)]
    pub mygps_api_key: Option<String>,

    /// Enable the semantic index source over ingested content.
    #[serde(default = "default_index_enabled")]
    pub index_enabled: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            deadline_ms: default_search_deadline_ms(),
            snippet_byte_budget: default_snippet_byte_budget(),
            fidelity_base_url: default_fidelity_base_url(),
            mygps_api_url: None,
            mygps_api_key: None,
            index_enabled: default_index_enabled(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_search_deadline_ms() -> u64 {
    10_000
}

fn default_snippet_byte_budget() -> usize {
    2048
}

fn default_fidelity_base_url() -> String {
    "https://www.fidelity.com".to_string()
}

fn default_index_enabled() -> bool {
    true
}

/// Anthropic API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Anthropic API key. `None` requires the environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// API version header value.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Concrete model behind the `generator` logical tag.
    #[serde(default = "default_generator_model")]
    pub generator_model: String,

    /// Concrete model behind the `evaluator` logical tag.
    #[serde(default = "default_evaluator_model")]
    pub evaluator_model: String,

    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_version: default_api_version(),
            generator_model: default_generator_model(),
            evaluator_model: default_evaluator_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_generator_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_evaluator_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "repflow.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP/WebSocket gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for mutating routes. `None` disables auth.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}
