// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! On-disk layout of finished recordings
//!
//! Each recording is a pair `recording_<id>.json` + `recording_<id>.webm` in
//! one directory. Documents are written to a temporary sibling and renamed
//! into place so readers never observe a partial file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kasca_protocol::RecordingDocument;
use serde::Serialize;
use tracing::{debug, warn};

use crate::ebml;
use crate::error::{RecorderError, RecorderResult};

const FILE_PREFIX: &str = "recording_";
const DOCUMENT_SUFFIX: &str = ".json";
const AUDIO_SUFFIX: &str = ".webm";

#[derive(Debug, Clone)]
pub struct RecordingStore {
    dir: PathBuf,
}

/// Aggregate numbers over a recordings directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetSummary {
    /// Documents with a matching audio file.
    pub pairs: usize,
    /// Keystroke records across all paired documents.
    pub keystrokes: usize,
    /// `keystrokes / pairs`, zero for an empty dataset.
    pub avg_keystrokes_per_record: f64,
    #[serde(serialize_with = "serialize_secs")]
    pub audio_duration: Duration,
    /// Paired audio files whose container carries no readable duration.
    pub audio_without_duration: usize,
    pub unpaired_documents: Vec<String>,
    pub unpaired_audio: Vec<String>,
    pub invalid_documents: Vec<String>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Recording ids become part of file names, so they are restricted to a
/// conservative character set.
pub fn validate_recording_id(id: &str) -> RecorderResult<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RecorderError::InvalidRecordingId(id.to_string()))
    }
}

impl RecordingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> RecorderResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn document_filename(recording_id: &str) -> String {
        format!("{FILE_PREFIX}{recording_id}{DOCUMENT_SUFFIX}")
    }

    pub fn audio_filename(recording_id: &str) -> String {
        format!("{FILE_PREFIX}{recording_id}{AUDIO_SUFFIX}")
    }

    pub fn document_path(&self, recording_id: &str) -> PathBuf {
        self.dir.join(Self::document_filename(recording_id))
    }

    pub fn audio_path(&self, recording_id: &str) -> PathBuf {
        self.dir.join(Self::audio_filename(recording_id))
    }

    /// Whether a document or audio file for `recording_id` is already on disk.
    pub async fn contains(&self, recording_id: &str) -> RecorderResult<bool> {
        Ok(tokio::fs::try_exists(self.document_path(recording_id)).await?
            || tokio::fs::try_exists(self.audio_path(recording_id)).await?)
    }

    /// Atomically write `doc` as `recording_<id>.json`.
    pub async fn save(&self, doc: &RecordingDocument) -> RecorderResult<PathBuf> {
        validate_recording_id(&doc.recording_id)?;
        self.ensure_dir().await?;

        let path = self.document_path(&doc.recording_id);
        let content = doc.to_json_pretty()?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content.as_bytes()).await?;
        if let Err(err) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(err.into());
        }

        debug!(
            path = %path.display(),
            keystrokes = doc.keystrokes.len(),
            "Saved recording document"
        );
        Ok(path)
    }

    pub async fn load(&self, recording_id: &str) -> RecorderResult<RecordingDocument> {
        validate_recording_id(recording_id)?;
        read_document(&self.document_path(recording_id)).await
    }

    /// Pair every `<stem>.json` with a `<stem>.webm` and total up keystroke
    /// records and audio time. Pairing goes by file stem only, so files
    /// written by other tools count as long as both halves are present.
    pub async fn summarize(&self) -> RecorderResult<DatasetSummary> {
        let mut documents = Vec::new();
        let mut audio = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(DOCUMENT_SUFFIX) {
                documents.push(stem.to_string());
            } else if let Some(stem) = name.strip_suffix(AUDIO_SUFFIX) {
                audio.push(stem.to_string());
            }
        }
        documents.retain(|stem| !stem.is_empty());
        audio.retain(|stem| !stem.is_empty());
        documents.sort();
        audio.sort();

        let mut summary = DatasetSummary::default();
        for stem in &documents {
            let document_name = format!("{stem}{DOCUMENT_SUFFIX}");
            if audio.binary_search(stem).is_err() {
                summary.unpaired_documents.push(document_name);
                continue;
            }

            let doc = match read_document(&self.dir.join(&document_name)).await {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(
                        file = %document_name,
                        error = %err,
                        "Skipping unreadable recording document"
                    );
                    summary.invalid_documents.push(document_name);
                    continue;
                }
            };

            summary.pairs += 1;
            summary.keystrokes += doc.keystrokes.len();
            let audio_path = self.dir.join(format!("{stem}{AUDIO_SUFFIX}"));
            match ebml::read_duration(&audio_path).await {
                Ok(Some(duration)) => summary.audio_duration += duration,
                Ok(None) => summary.audio_without_duration += 1,
                Err(err) => {
                    debug!(file = %audio_path.display(), error = %err, "Audio duration unreadable");
                    summary.audio_without_duration += 1;
                }
            }
        }

        if summary.pairs > 0 {
            summary.avg_keystrokes_per_record = summary.keystrokes as f64 / summary.pairs as f64;
        }
        summary.unpaired_audio = audio
            .iter()
            .filter(|stem| documents.binary_search(*stem).is_err())
            .map(|stem| format!("{stem}{AUDIO_SUFFIX}"))
            .collect();

        Ok(summary)
    }
}

async fn read_document(path: &Path) -> RecorderResult<RecordingDocument> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(RecordingDocument::from_json(&text)?)
}
