// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Repflow orchestrator.
//!
//! Layered TOML + environment loading via Figment, with post-load
//! semantic validation.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::RepflowConfig;
pub use validation::{validate_config, ConfigError};
