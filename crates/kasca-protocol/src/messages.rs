// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! JSON text frames exchanged over the two WebSocket endpoints

use chrono::{DateTime, Utc};
use kasca_timeline::InputEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// Roster entry describing one live keyboard session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub session_id: String,
    pub connected_at: DateTime<Utc>,
}

/// Messages the server sends to either kind of client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionAssigned {
        session_id: String,
    },
    ClientList {
        clients: Vec<ClientInfo>,
    },
    RecordingStarted {
        recording_id: String,
        keyboard_session_id: String,
        start_timestamp: i64,
    },
    RecordingStopped {
        recording_id: String,
        end_timestamp: i64,
        filename: String,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<Value>,
    },
}

impl ServerMessage {
    pub fn error(error: impl Into<String>, context: Option<Value>) -> Self {
        ServerMessage::Error {
            error: error.into(),
            context,
        }
    }

    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Commands a control client sends as text frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorCommand {
    StartRecording {
        keyboard_session_id: String,
        recording_id: String,
    },
    StopRecording {
        recording_id: String,
    },
}

impl MonitorCommand {
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let command: MonitorCommand = serde_json::from_str(text)?;
        match &command {
            MonitorCommand::StartRecording {
                keyboard_session_id,
                recording_id,
            } => {
                require_non_empty("keyboard_session_id", keyboard_session_id)?;
                require_non_empty("recording_id", recording_id)?;
            }
            MonitorCommand::StopRecording { recording_id } => {
                require_non_empty("recording_id", recording_id)?;
            }
        }
        Ok(command)
    }
}

/// One event streamed by a keyboard client.
///
/// `session_id` is informational; the server attributes events to the
/// connection they arrive on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputMessage {
    #[serde(rename = "keydown")]
    KeyDown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        timestamp: i64,
        #[serde(alias = "code")]
        key: String,
    },
    #[serde(rename = "keyup")]
    KeyUp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        timestamp: i64,
        #[serde(alias = "code")]
        key: String,
    },
    #[serde(rename = "pointerdown")]
    PointerDown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        timestamp: i64,
        position: usize,
    },
    #[serde(rename = "pointerup")]
    PointerUp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection_start: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection_end: Option<usize>,
    },
    #[serde(rename = "selectdelta")]
    SelectDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        timestamp: i64,
        delta: i64,
    },
}

impl InputMessage {
    /// Decode and validate a text frame from a keyboard client.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let message: InputMessage = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> ProtocolResult<()> {
        if self.timestamp() < 0 {
            return Err(ProtocolError::invalid("timestamp", "must not be negative"));
        }
        match self {
            InputMessage::KeyDown { key, .. } | InputMessage::KeyUp { key, .. } => {
                require_non_empty("key", key)
            }
            _ => Ok(()),
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            InputMessage::KeyDown { timestamp, .. }
            | InputMessage::KeyUp { timestamp, .. }
            | InputMessage::PointerDown { timestamp, .. }
            | InputMessage::PointerUp { timestamp, .. }
            | InputMessage::SelectDelta { timestamp, .. } => *timestamp,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            InputMessage::KeyDown { session_id, .. }
            | InputMessage::KeyUp { session_id, .. }
            | InputMessage::PointerDown { session_id, .. }
            | InputMessage::PointerUp { session_id, .. }
            | InputMessage::SelectDelta { session_id, .. } => session_id.as_deref(),
        }
    }
}

impl From<InputMessage> for InputEvent {
    fn from(message: InputMessage) -> Self {
        match message {
            InputMessage::KeyDown { timestamp, key, .. } => InputEvent::KeyDown {
                code: key,
                t: timestamp,
            },
            InputMessage::KeyUp { timestamp, key, .. } => InputEvent::KeyUp {
                code: key,
                t: timestamp,
            },
            InputMessage::PointerDown {
                timestamp,
                position,
                ..
            } => InputEvent::PointerDown {
                t: timestamp,
                pos: position,
            },
            InputMessage::PointerUp {
                timestamp,
                selection_start,
                selection_end,
                ..
            } => InputEvent::PointerUp {
                t: timestamp,
                sel_start: selection_start,
                sel_end: selection_end,
            },
            InputMessage::SelectDelta {
                timestamp, delta, ..
            } => InputEvent::SelectDelta {
                t: timestamp,
                delta,
            },
        }
    }
}

fn require_non_empty(field: &'static str, value: &str) -> ProtocolResult<()> {
    if value.trim().is_empty() {
        Err(ProtocolError::invalid(field, "must not be empty"))
    } else {
        Ok(())
    }
}
