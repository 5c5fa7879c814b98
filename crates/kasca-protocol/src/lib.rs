// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Wire contract between kasca clients and the server
//!
//! Every message direction is a closed tagged union decoded once at the
//! socket boundary: keyboard clients send [`InputMessage`], control clients
//! send [`MonitorCommand`] text frames plus binary [`AudioFrame`]s, and the
//! server answers with [`ServerMessage`]. Finished recordings are stored as a
//! [`RecordingDocument`].

pub mod document;
pub mod error;
pub mod frame;
pub mod messages;

pub use document::{KeystrokeRecord, RecordingDocument};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{AUDIO_HEADER_LEN, AudioFrame, ID_FIELD_LEN};
pub use messages::{ClientInfo, InputMessage, MonitorCommand, ServerMessage};

/// Opaque identifier assigned to each connection.
pub type SessionId = String;

/// Identifier chosen by the control client for a recording.
pub type RecordingId = String;
