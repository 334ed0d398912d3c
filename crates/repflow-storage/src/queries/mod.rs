// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod conversations;
pub mod messages;
pub mod resolutions;
pub mod runs;

/// Wraps a row decoding failure (bad enum tag, malformed JSON column) in a
/// rusqlite error so it propagates through `conn.call()` like any other
/// query failure.
pub(crate) fn decode_err(e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}
