// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Application state shared by every connection

use std::sync::Arc;

use kasca_protocol::ServerMessage;
use kasca_recorder::{FinalizedRecording, RecordingRegistry, RecordingStore};
use tracing::debug;

use crate::config::ServerConfig;
use crate::roster::Roster;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub roster: Arc<Roster>,
    pub recordings: Arc<RecordingRegistry>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let store = RecordingStore::new(config.recordings_dir.clone());
        let finalizer = config.audio_finalizer.build(&config.ffmpeg_path);
        let recordings = RecordingRegistry::new(store, finalizer, config.sink_options());
        Self {
            config: Arc::new(config),
            roster: Arc::new(Roster::new()),
            recordings: Arc::new(recordings),
        }
    }

    /// Tell the monitor that started `done` that it has been persisted.
    pub async fn announce_stopped(&self, done: &FinalizedRecording) {
        let message = ServerMessage::RecordingStopped {
            recording_id: done.recording_id.clone(),
            end_timestamp: done.end_timestamp,
            filename: done.filename.clone(),
        };
        if !self.roster.send_to_monitor(&done.control_session_id, message).await {
            debug!(
                recording_id = %done.recording_id,
                control_session_id = %done.control_session_id,
                "Owning monitor is gone, recording_stopped not delivered"
            );
        }
    }
}
