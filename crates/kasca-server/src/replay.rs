// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Offline replay of a persisted recording

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use kasca_protocol::RecordingDocument;
use kasca_timeline::{Reconstruction, normalize_key_case, relative_key_events, sorted};
use serde::Serialize;

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Recording document (`recording_<id>.json`)
    pub file: PathBuf,

    /// Playback position in milliseconds from the recording start
    /// (default: end of the recording)
    #[arg(long, value_name = "MS")]
    pub at: Option<i64>,

    /// Print the key events as JSON lines relative to the first event instead
    #[arg(long)]
    pub events: bool,

    /// Lowercase letter keys logged without Shift held (older clients)
    #[arg(long)]
    pub normalize_case: bool,
}

/// Reconstructed state of a recording at one playback position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub recording_id: String,
    /// Milliseconds from `start_timestamp`.
    pub offset_ms: i64,
    pub text: String,
    pub cursor: usize,
    pub selection: Option<(usize, usize)>,
    pub pressed_keys: Vec<String>,
}

impl ReplayReport {
    pub fn build(doc: &RecordingDocument, at: Option<i64>, normalize_case: bool) -> Self {
        let mut events = doc.events();
        if normalize_case {
            normalize_key_case(&mut events);
        }
        let reconstruction = Reconstruction::build(&events, doc.start_timestamp);

        let t = match at {
            Some(offset) => doc.start_timestamp.saturating_add(offset),
            None => reconstruction
                .last_change()
                .map_or(doc.end_timestamp, |last| last.max(doc.end_timestamp)),
        };
        let text = reconstruction.text.state_at(t);
        let pressed = reconstruction.keys.state_at(t);

        Self {
            recording_id: doc.recording_id.clone(),
            offset_ms: t.saturating_sub(doc.start_timestamp),
            text: text.text.clone(),
            cursor: text.cursor,
            selection: text
                .has_selection()
                .then_some((text.selection_start, text.selection_end)),
            pressed_keys: pressed.iter().cloned().collect(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "recording {} at +{} ms\ncursor: {}\n",
            self.recording_id, self.offset_ms, self.cursor
        );
        if let Some((start, end)) = self.selection {
            out.push_str(&format!("selection: {start}..{end}\n"));
        }
        if self.pressed_keys.is_empty() {
            out.push_str("pressed: (none)\n");
        } else {
            out.push_str(&format!("pressed: {}\n", self.pressed_keys.join(" + ")));
        }
        out.push_str("text:\n");
        out.push_str(&self.text);
        if !self.text.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

impl ReplayArgs {
    pub async fn run(self) -> Result<()> {
        let doc = RecordingDocument::load(&self.file)
            .with_context(|| format!("Failed to load {}", self.file.display()))?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if self.events {
            let mut events = doc.events();
            if self.normalize_case {
                normalize_key_case(&mut events);
            }
            for row in relative_key_events(&sorted(&events)) {
                writeln!(out, "{}", serde_json::to_string(&row)?)?;
            }
        } else {
            let report = ReplayReport::build(&doc, self.at, self.normalize_case);
            write!(out, "{}", report.render())?;
        }
        Ok(())
    }
}
