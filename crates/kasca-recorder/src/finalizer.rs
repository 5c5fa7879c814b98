// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Container duration repair strategies

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::ebml;
use crate::error::FinalizeError;

/// Rewrites a finished audio file so its container reports `duration`.
///
/// Implementations must leave a playable file behind when they fail.
#[async_trait]
pub trait AudioFinalizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn finalize(&self, path: &Path, duration: Duration) -> Result<(), FinalizeError>;
}

/// Patches the WebM Duration element in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct EbmlDurationPatcher;

#[async_trait]
impl AudioFinalizer for EbmlDurationPatcher {
    fn name(&self) -> &'static str {
        "ebml"
    }

    async fn finalize(&self, path: &Path, duration: Duration) -> Result<(), FinalizeError> {
        let field = ebml::patch_file(path, duration).await?;
        debug!(
            path = %path.display(),
            offset = field.offset,
            width = field.width,
            duration_ms = duration.as_millis() as u64,
            "Patched WebM duration"
        );
        Ok(())
    }
}

/// Remuxes the file losslessly with ffmpeg, replacing it by rename.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    program: PathBuf,
}

impl FfmpegRemuxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl AudioFinalizer for FfmpegRemuxer {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn finalize(&self, path: &Path, _duration: Duration) -> Result<(), FinalizeError> {
        let remuxed = path.with_extension("remux.webm");

        let output = Command::new(&self.program)
            .arg("-y")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-c", "copy", "-f", "webm"])
            .arg(&remuxed)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                FinalizeError::Remux(format!("Failed to run {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&remuxed).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FinalizeError::Remux(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        if let Err(err) = tokio::fs::rename(&remuxed, path).await {
            let _ = tokio::fs::remove_file(&remuxed).await;
            return Err(err.into());
        }
        debug!(path = %path.display(), "Remuxed audio container");
        Ok(())
    }
}

/// Leaves the file as streamed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFinalizer;

#[async_trait]
impl AudioFinalizer for NoopFinalizer {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn finalize(&self, _path: &Path, _duration: Duration) -> Result<(), FinalizeError> {
        Ok(())
    }
}

/// Configurable choice of finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizerKind {
    #[default]
    Ebml,
    Ffmpeg,
    None,
}

impl FinalizerKind {
    pub fn build(self, ffmpeg_path: &Path) -> Arc<dyn AudioFinalizer> {
        match self {
            FinalizerKind::Ebml => Arc::new(EbmlDurationPatcher),
            FinalizerKind::Ffmpeg => Arc::new(FfmpegRemuxer::new(ffmpeg_path)),
            FinalizerKind::None => Arc::new(NoopFinalizer),
        }
    }
}

impl fmt::Display for FinalizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalizerKind::Ebml => "ebml",
            FinalizerKind::Ffmpeg => "ffmpeg",
            FinalizerKind::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for FinalizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ebml" => Ok(FinalizerKind::Ebml),
            "ffmpeg" | "remux" => Ok(FinalizerKind::Ffmpeg),
            "none" | "off" => Ok(FinalizerKind::None),
            other => Err(format!(
                "Unknown audio finalizer '{other}', expected ebml, ffmpeg or none"
            )),
        }
    }
}
