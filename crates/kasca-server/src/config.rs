// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Server configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! command line flags and `KASCA_*` environment variables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kasca_recorder::{FinalizerKind, SinkOptions};
use serde::Deserialize;

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Directory receiving `recording_<id>.json` / `.webm` pairs
    pub recordings_dir: PathBuf,

    /// How finished audio files get their duration repaired
    pub audio_finalizer: FinalizerKind,

    /// ffmpeg executable used by the `ffmpeg` finalizer
    pub ffmpeg_path: PathBuf,

    /// Chunks buffered per recording before monitors are back-pressured
    pub audio_queue_capacity: usize,

    /// Finalize recordings that saw no event and no audio for this long.
    /// `0` disables the watchdog.
    pub idle_recording_timeout_secs: u64,

    /// How often the watchdog looks for idle recordings
    pub idle_check_interval_secs: u64,

    /// Upper bound of a random delay injected before each chunk write.
    /// Only useful for exercising ordering in tests.
    pub chunk_delay_ms_max: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            recordings_dir: PathBuf::from("./recordings"),
            audio_finalizer: FinalizerKind::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            audio_queue_capacity: SinkOptions::default().queue_capacity,
            idle_recording_timeout_secs: 300,
            idle_check_interval_secs: 5,
            chunk_delay_ms_max: 0,
        }
    }
}

/// Contents of a `--config` TOML file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind_addr: Option<SocketAddr>,
    pub recordings_dir: Option<PathBuf>,
    pub audio_finalizer: Option<FinalizerKind>,
    pub ffmpeg_path: Option<PathBuf>,
    pub audio_queue_capacity: Option<usize>,
    pub idle_recording_timeout_secs: Option<u64>,
    pub idle_check_interval_secs: Option<u64>,
    pub chunk_delay_ms_max: Option<u64>,
}

impl FileConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }
}

impl ServerConfig {
    /// Overlay every key present in `file`.
    pub fn merge(&mut self, file: FileConfig) {
        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file.recordings_dir {
            self.recordings_dir = v;
        }
        if let Some(v) = file.audio_finalizer {
            self.audio_finalizer = v;
        }
        if let Some(v) = file.ffmpeg_path {
            self.ffmpeg_path = v;
        }
        if let Some(v) = file.audio_queue_capacity {
            self.audio_queue_capacity = v;
        }
        if let Some(v) = file.idle_recording_timeout_secs {
            self.idle_recording_timeout_secs = v;
        }
        if let Some(v) = file.idle_check_interval_secs {
            self.idle_check_interval_secs = v;
        }
        if let Some(v) = file.chunk_delay_ms_max {
            self.chunk_delay_ms_max = v;
        }
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.audio_queue_capacity == 0 {
            return Err(ServerError::Config(
                "audio_queue_capacity must be at least 1".into(),
            ));
        }
        if self.idle_recording_timeout_secs > 0 && self.idle_check_interval_secs == 0 {
            return Err(ServerError::Config(
                "idle_check_interval_secs must be at least 1 when the idle timeout is enabled"
                    .into(),
            ));
        }
        Ok(())
    }

    /// `None` when the idle watchdog is disabled.
    pub fn idle_recording_timeout(&self) -> Option<Duration> {
        (self.idle_recording_timeout_secs > 0)
            .then(|| Duration::from_secs(self.idle_recording_timeout_secs))
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_secs.max(1))
    }

    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions::default()
            .with_queue_capacity(self.audio_queue_capacity)
            .with_max_chunk_delay(Duration::from_millis(self.chunk_delay_ms_max))
    }
}
