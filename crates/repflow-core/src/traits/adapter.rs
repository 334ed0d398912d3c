// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait implemented by every pluggable component.

use async_trait::async_trait;

use crate::error::RepflowError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all Repflow component adapters.
///
/// Every adapter (provider, source, storage, observability) implements this
/// trait, which provides identity, lifecycle, and health check capabilities.
#[async_trait]
pub trait ComponentAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the type of adapter (provider, source, storage, etc.).
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, RepflowError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), RepflowError>;
}
