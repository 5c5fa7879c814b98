// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! kasca WebSocket server
//!
//! Keyboard clients stream input events over `/ws/keyboard`; control clients
//! on `/ws/control` watch the roster of keyboards, start and stop recordings
//! and stream audio for them. Finished recordings land in the recordings
//! directory as a JSON document plus a WebM file.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod replay;
pub mod roster;
pub mod server;
pub mod state;
pub mod stats;
pub mod transport;
pub mod watchdog;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::Server;
pub use state::AppState;
