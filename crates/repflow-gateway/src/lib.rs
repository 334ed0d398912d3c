// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the Repflow orchestrator.
//!
//! REST surface for conversation and message CRUD, run requests,
//! cancellation, and resolution review, plus a per-conversation WebSocket
//! stream of workflow progress events. The gateway is a thin shell: all
//! orchestration lives in `repflow-workflow`, all persistence behind the
//! storage port.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::AuthConfig;
pub use server::{build_router, start_server, GatewayState, HealthState, ServerConfig};
