// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

// Recording lifecycle
//
// A recording is Active while it is in the `active` table and accepts events
// and audio. Finalizing removes it from that table under the lock, so exactly
// one caller wins no matter how many disconnect or stop paths race; the
// winner drains the audio sink, repairs the container and persists the event
// log. Afterwards the recording is Closed and unknown to the registry, and
// every further finalize call for it is a no-op.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kasca_protocol::{KeystrokeRecord, RecordingDocument};
use kasca_timeline::InputEvent;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{RecorderError, RecorderResult};
use crate::finalizer::AudioFinalizer;
use crate::sink::{AudioSink, SinkOptions, SinkReport};
use crate::store::{RecordingStore, validate_recording_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Active,
    Finalizing,
}

/// Why a recording left the Active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    Stopped,
    InputDisconnected,
    MonitorDisconnected,
    IdleTimeout,
    Shutdown,
}

impl fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FinalizeReason::Stopped => "stopped",
            FinalizeReason::InputDisconnected => "input_disconnected",
            FinalizeReason::MonitorDisconnected => "monitor_disconnected",
            FinalizeReason::IdleTimeout => "idle_timeout",
            FinalizeReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedRecording {
    pub recording_id: String,
    pub keyboard_session_id: String,
    pub start_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedRecording {
    pub recording_id: String,
    pub keyboard_session_id: String,
    pub control_session_id: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    /// Document file name, relative to the recordings directory.
    pub filename: String,
    pub reason: FinalizeReason,
    pub keystrokes: usize,
    /// `None` when the sink could not be drained.
    pub audio: Option<SinkReport>,
}

struct ActiveRecording {
    keyboard_session_id: String,
    control_session_id: String,
    start_timestamp: i64,
    events: Vec<InputEvent>,
    sink: AudioSink,
    last_activity: Instant,
}

#[derive(Default)]
struct Inner {
    active: HashMap<String, ActiveRecording>,
    by_input: HashMap<String, String>,
    finalizing: HashSet<String>,
}

/// Table of live recordings plus the collaborators needed to close them.
pub struct RecordingRegistry {
    inner: Mutex<Inner>,
    store: RecordingStore,
    finalizer: Arc<dyn AudioFinalizer>,
    sink_options: SinkOptions,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl RecordingRegistry {
    pub fn new(
        store: RecordingStore,
        finalizer: Arc<dyn AudioFinalizer>,
        sink_options: SinkOptions,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            store,
            finalizer,
            sink_options,
        }
    }

    pub fn store(&self) -> &RecordingStore {
        &self.store
    }

    /// Open a recording of `keyboard_session_id` on behalf of a control
    /// session. The caller has already checked that the input session is live.
    pub async fn start(
        &self,
        recording_id: &str,
        keyboard_session_id: &str,
        control_session_id: &str,
    ) -> RecorderResult<StartedRecording> {
        validate_recording_id(recording_id)?;

        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.by_input.get(keyboard_session_id) {
            return Err(RecorderError::AlreadyRecording {
                keyboard_session_id: keyboard_session_id.to_string(),
                recording_id: existing.clone(),
            });
        }
        if inner.active.contains_key(recording_id) || inner.finalizing.contains(recording_id) {
            return Err(RecorderError::DuplicateRecordingId(recording_id.to_string()));
        }

        self.store.ensure_dir().await?;
        if self.store.contains(recording_id).await? {
            return Err(RecorderError::DuplicateRecordingId(recording_id.to_string()));
        }
        let audio_path = self.store.audio_path(recording_id);
        let sink = match AudioSink::open(recording_id, &audio_path, &self.sink_options).await {
            Ok(sink) => sink,
            Err(RecorderError::Io(err)) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(RecorderError::DuplicateRecordingId(recording_id.to_string()));
            }
            Err(err) => return Err(err),
        };
        let start_timestamp = now_millis();

        inner
            .by_input
            .insert(keyboard_session_id.to_string(), recording_id.to_string());
        inner.active.insert(
            recording_id.to_string(),
            ActiveRecording {
                keyboard_session_id: keyboard_session_id.to_string(),
                control_session_id: control_session_id.to_string(),
                start_timestamp,
                events: Vec::new(),
                sink,
                last_activity: Instant::now(),
            },
        );

        info!(
            recording_id,
            keyboard_session_id, control_session_id, start_timestamp, "Recording started"
        );
        Ok(StartedRecording {
            recording_id: recording_id.to_string(),
            keyboard_session_id: keyboard_session_id.to_string(),
            start_timestamp,
        })
    }

    /// Append an input event to the recording targeting `keyboard_session_id`.
    /// Returns the recording id, or `None` when nothing is recording it.
    pub async fn record_event(
        &self,
        keyboard_session_id: &str,
        event: InputEvent,
    ) -> Option<String> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let recording_id = inner.by_input.get(keyboard_session_id)?;
        let recording = inner.active.get_mut(recording_id)?;
        trace!(%recording_id, t = event.t(), "Recorded input event");
        recording.events.push(event);
        recording.last_activity = Instant::now();
        Some(recording_id.clone())
    }

    /// Queue an audio chunk for `recording_id`.
    ///
    /// `keyboard_session_id` is the value from the frame header; the recording
    /// id is authoritative and a mismatch is only logged.
    pub async fn append_audio(
        &self,
        recording_id: &str,
        keyboard_session_id: &str,
        chunk: Vec<u8>,
    ) -> RecorderResult<()> {
        let sink = {
            let mut inner = self.inner.lock().await;
            let recording = inner
                .active
                .get_mut(recording_id)
                .ok_or_else(|| RecorderError::RecordingNotFound(recording_id.to_string()))?;
            if !keyboard_session_id.is_empty()
                && keyboard_session_id != recording.keyboard_session_id
            {
                debug!(
                    recording_id,
                    header_session = keyboard_session_id,
                    recording_session = %recording.keyboard_session_id,
                    "Audio chunk header names a different keyboard session"
                );
            }
            recording.last_activity = Instant::now();
            recording.sink.clone()
        };
        sink.append(chunk).await
    }

    /// Finalize `recording_id`. `Ok(None)` when it is not Active, which makes
    /// repeated or racing calls harmless.
    pub async fn finalize(
        &self,
        recording_id: &str,
        reason: FinalizeReason,
    ) -> RecorderResult<Option<FinalizedRecording>> {
        let recording = {
            let mut inner = self.inner.lock().await;
            let Some(recording) = inner.active.remove(recording_id) else {
                debug!(recording_id, %reason, "Finalize ignored, recording is not active");
                return Ok(None);
            };
            inner.by_input.remove(&recording.keyboard_session_id);
            inner.finalizing.insert(recording_id.to_string());
            recording
        };

        let result = self.close(recording_id, recording, reason).await;
        self.inner.lock().await.finalizing.remove(recording_id);
        result.map(Some)
    }

    pub async fn stop(&self, recording_id: &str) -> RecorderResult<Option<FinalizedRecording>> {
        self.finalize(recording_id, FinalizeReason::Stopped).await
    }

    /// Finalize whatever is recording `keyboard_session_id`.
    pub async fn finalize_for_input(
        &self,
        keyboard_session_id: &str,
        reason: FinalizeReason,
    ) -> RecorderResult<Option<FinalizedRecording>> {
        let recording_id = self.inner.lock().await.by_input.get(keyboard_session_id).cloned();
        match recording_id {
            Some(id) => self.finalize(&id, reason).await,
            None => Ok(None),
        }
    }

    /// Finalize every recording started by `control_session_id`.
    pub async fn finalize_for_control(
        &self,
        control_session_id: &str,
        reason: FinalizeReason,
    ) -> Vec<FinalizedRecording> {
        let ids: Vec<String> = {
            let inner = self.inner.lock().await;
            inner
                .active
                .iter()
                .filter(|(_, r)| r.control_session_id == control_session_id)
                .map(|(id, _)| id.clone())
                .collect()
        };
        self.finalize_each(ids, reason).await
    }

    /// Finalize recordings that saw neither an event nor an audio chunk for
    /// `max_idle`.
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<FinalizedRecording> {
        let ids: Vec<String> = {
            let inner = self.inner.lock().await;
            inner
                .active
                .iter()
                .filter(|(_, r)| r.last_activity.elapsed() >= max_idle)
                .map(|(id, _)| id.clone())
                .collect()
        };
        if !ids.is_empty() {
            info!(count = ids.len(), idle_secs = max_idle.as_secs(), "Finalizing idle recordings");
        }
        self.finalize_each(ids, FinalizeReason::IdleTimeout).await
    }

    pub async fn finalize_all(&self, reason: FinalizeReason) -> Vec<FinalizedRecording> {
        let ids: Vec<String> = self.inner.lock().await.active.keys().cloned().collect();
        self.finalize_each(ids, reason).await
    }

    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.active.len()
    }

    /// `None` once the recording is Closed (or was never started).
    pub async fn state_of(&self, recording_id: &str) -> Option<RecordingState> {
        let inner = self.inner.lock().await;
        if inner.active.contains_key(recording_id) {
            Some(RecordingState::Active)
        } else if inner.finalizing.contains(recording_id) {
            Some(RecordingState::Finalizing)
        } else {
            None
        }
    }

    pub async fn recording_for_input(&self, keyboard_session_id: &str) -> Option<String> {
        self.inner.lock().await.by_input.get(keyboard_session_id).cloned()
    }

    async fn finalize_each(
        &self,
        ids: Vec<String>,
        reason: FinalizeReason,
    ) -> Vec<FinalizedRecording> {
        let mut finalized = Vec::with_capacity(ids.len());
        for id in ids {
            match self.finalize(&id, reason).await {
                Ok(Some(done)) => finalized.push(done),
                Ok(None) => {}
                Err(err) => {
                    warn!(recording_id = %id, %reason, error = %err, "Failed to finalize recording")
                }
            }
        }
        finalized
    }

    async fn close(
        &self,
        recording_id: &str,
        recording: ActiveRecording,
        reason: FinalizeReason,
    ) -> RecorderResult<FinalizedRecording> {
        let ActiveRecording {
            keyboard_session_id,
            control_session_id,
            start_timestamp,
            events,
            sink,
            ..
        } = recording;
        let end_timestamp = now_millis().max(start_timestamp);
        let audio_path = sink.path().to_path_buf();

        let audio = match sink.finish().await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(recording_id, error = %err, "Audio sink did not drain cleanly");
                None
            }
        };

        let duration = Duration::from_millis((end_timestamp - start_timestamp) as u64);
        if let Err(err) = self.finalizer.finalize(&audio_path, duration).await {
            warn!(
                recording_id,
                finalizer = self.finalizer.name(),
                error = %err,
                "Audio container repair failed, keeping the file as streamed"
            );
        }

        let document = RecordingDocument {
            recording_id: recording_id.to_string(),
            start_timestamp,
            end_timestamp,
            keyboard_session_id: keyboard_session_id.clone(),
            control_session_id: control_session_id.clone(),
            keystrokes: events.iter().map(KeystrokeRecord::from).collect(),
            audio_file: RecordingStore::audio_filename(recording_id),
        };
        self.store.save(&document).await?;

        info!(
            recording_id,
            %reason,
            keystrokes = events.len(),
            audio_bytes = audio.as_ref().map(|a| a.bytes_written).unwrap_or(0),
            audio_dropped = audio.as_ref().map(|a| a.dropped_chunks).unwrap_or(0),
            duration_ms = end_timestamp - start_timestamp,
            "Recording finalized"
        );

        Ok(FinalizedRecording {
            recording_id: recording_id.to_string(),
            keyboard_session_id,
            control_session_id,
            start_timestamp,
            end_timestamp,
            filename: RecordingStore::document_filename(recording_id),
            reason,
            keystrokes: events.len(),
            audio,
        })
    }
}
