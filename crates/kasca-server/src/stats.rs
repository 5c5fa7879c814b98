// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Dataset summary over a recordings directory

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use kasca_recorder::{DatasetSummary, RecordingStore};

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Recordings directory
    #[arg(default_value = "./recordings", env = "KASCA_RECORDINGS_DIR")]
    pub dir: PathBuf,

    /// Emit the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsArgs {
    pub async fn run(self) -> Result<()> {
        let summary = RecordingStore::new(&self.dir)
            .summarize()
            .await
            .with_context(|| format!("Failed to scan {}", self.dir.display()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print!("{}", render(&summary));
        }
        Ok(())
    }
}

pub fn render(summary: &DatasetSummary) -> String {
    let total_secs = summary.audio_duration.as_secs_f64();
    let mut out = format!(
        "Recordings: {}\nKeystrokes: {}\n",
        summary.pairs,
        summary.keystrokes
    );
    out.push_str(&format!(
        "Keystrokes per recording: {:.1}\nAudio: {:.1} s ({:.2} h)\n",
        summary.avg_keystrokes_per_record,
        total_secs,
        total_secs / 3600.0
    ));
    if summary.audio_without_duration > 0 {
        out.push_str(&format!(
            "Audio files without a duration: {}\n",
            summary.audio_without_duration
        ));
    }
    for (label, names) in [
        ("Documents without audio", &summary.unpaired_documents),
        ("Audio without a document", &summary.unpaired_audio),
        ("Unreadable documents", &summary.invalid_documents),
    ] {
        if names.is_empty() {
            continue;
        }
        out.push_str(&format!("{label} ({}):\n", names.len()));
        for name in names {
            out.push_str(&format!("  {name}\n"));
        }
    }
    out
}
