// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-source adapter trait for the search fan-out.

use std::time::Duration;

use async_trait::async_trait;

use crate::traits::adapter::ComponentAdapter;
use crate::types::{SourceErrorKind, SourceResult};

/// Adapter for one searchable content source.
///
/// Adapters are registered once at startup in a stable preference order.
/// Errors surface as a [`SourceErrorKind`] that the fan-out records per
/// source; an adapter failure never fails the workflow.
#[async_trait]
pub trait SourceAdapter: ComponentAdapter {
    /// Stable tag identifying this source in results and error maps.
    fn source_tag(&self) -> &str;

    /// Searches the source, returning up to `k` results within `deadline`.
    ///
    /// The fan-out additionally enforces the deadline externally and
    /// records a `timeout` entry for adapters that overrun it.
    async fn search(
        &self,
        query: &str,
        k: usize,
        deadline: Duration,
    ) -> Result<Vec<SourceResult>, SourceErrorKind>;
}
