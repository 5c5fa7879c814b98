// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the recording lifecycle and audio finalization

use kasca_protocol::ProtocolError;
use thiserror::Error;

pub type RecorderResult<T> = Result<T, RecorderError>;

/// Errors surfaced to the connection that triggered the operation.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Recording not found: {0}")]
    RecordingNotFound(String),

    #[error("Keyboard session {keyboard_session_id} is already recording ({recording_id})")]
    AlreadyRecording {
        keyboard_session_id: String,
        recording_id: String,
    },

    #[error("Recording id {0} is already in use")]
    DuplicateRecordingId(String),

    #[error("Recording id {0:?} is not usable as a file name")]
    InvalidRecordingId(String),

    #[error("Audio sink for recording {0} is closed")]
    SinkClosed(String),

    #[error("Audio file for recording {0} stopped accepting writes")]
    SinkFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid recording document: {0}")]
    Document(#[from] ProtocolError),
}

impl RecorderError {
    /// Short machine-readable tag placed in `error.context.reason` replies.
    pub fn reason(&self) -> &'static str {
        match self {
            RecorderError::RecordingNotFound(_) => "recording_not_found",
            RecorderError::AlreadyRecording { .. } => "already_recording",
            RecorderError::DuplicateRecordingId(_) => "already_recording",
            RecorderError::InvalidRecordingId(_) => "invalid_recording_id",
            RecorderError::SinkClosed(_) => "sink_closed",
            RecorderError::SinkFailed(_) => "sink_failed",
            RecorderError::Io(_) | RecorderError::Document(_) => "storage",
        }
    }
}

/// Container repair failures. Always logged and never fatal to finalization.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("Not an EBML stream")]
    NotEbml,

    #[error("Malformed EBML at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },

    #[error("Segment info has no duration field")]
    DurationFieldMissing,

    #[error("Duration field has unsupported width {0}")]
    UnsupportedWidth(usize),

    #[error("Remux failed: {0}")]
    Remux(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
