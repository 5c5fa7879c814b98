// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Persisted recording document (`recording_<id>.json`)

use std::path::Path;

use kasca_timeline::InputEvent;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProtocolResult;

/// Everything captured for one finished recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingDocument {
    pub recording_id: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub keyboard_session_id: String,
    pub control_session_id: String,
    #[serde(default)]
    pub keystrokes: Vec<KeystrokeRecord>,
    /// File name of the audio stream, relative to the document's directory.
    pub audio_file: String,
}

/// One captured input event as stored on disk.
///
/// Older datasets used `time` and `type` for the first and third fields and
/// sometimes stored fractional milliseconds; both are accepted on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokeRecord {
    #[serde(alias = "time", deserialize_with = "deserialize_millis")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(alias = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl KeystrokeRecord {
    fn blank(timestamp: i64, event_type: &str) -> Self {
        Self {
            timestamp,
            key: None,
            event_type: event_type.to_string(),
            position: None,
            selection_start: None,
            selection_end: None,
            delta: None,
        }
    }

    /// Interpret the stored record, `None` for unknown or incomplete ones.
    pub fn to_event(&self) -> Option<InputEvent> {
        let t = self.timestamp;
        let kind = self.event_type.to_ascii_lowercase();
        let event = match kind.as_str() {
            "keydown" | "down" | "press" => InputEvent::key_down(self.key.clone()?, t),
            "keyup" | "up" | "release" => InputEvent::key_up(self.key.clone()?, t),
            "pointerdown" => InputEvent::PointerDown {
                t,
                pos: self.position?,
            },
            "pointerup" => InputEvent::PointerUp {
                t,
                sel_start: self.selection_start,
                sel_end: self.selection_end,
            },
            "selectdelta" => InputEvent::SelectDelta {
                t,
                delta: self.delta?,
            },
            _ => return None,
        };
        Some(event)
    }
}

impl From<&InputEvent> for KeystrokeRecord {
    fn from(event: &InputEvent) -> Self {
        match event {
            InputEvent::KeyDown { code, t } => Self {
                key: Some(code.clone()),
                ..Self::blank(*t, "keydown")
            },
            InputEvent::KeyUp { code, t } => Self {
                key: Some(code.clone()),
                ..Self::blank(*t, "keyup")
            },
            InputEvent::PointerDown { t, pos } => Self {
                position: Some(*pos),
                ..Self::blank(*t, "pointerdown")
            },
            InputEvent::PointerUp {
                t,
                sel_start,
                sel_end,
            } => Self {
                selection_start: *sel_start,
                selection_end: *sel_end,
                ..Self::blank(*t, "pointerup")
            },
            InputEvent::SelectDelta { t, delta } => Self {
                delta: Some(*delta),
                ..Self::blank(*t, "selectdelta")
            },
        }
    }
}

impl RecordingDocument {
    pub fn load(path: &Path) -> ProtocolResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decoded events in stored order, skipping records that cannot be
    /// interpreted.
    pub fn events(&self) -> Vec<InputEvent> {
        self.keystrokes
            .iter()
            .filter_map(KeystrokeRecord::to_event)
            .collect()
    }

    pub fn key_event_count(&self) -> usize {
        self.events().iter().filter(|e| e.is_key()).count()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_timestamp - self.start_timestamp).max(0)
    }
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Whole(i64),
        Fractional(f64),
    }

    Ok(match Millis::deserialize(deserializer)? {
        Millis::Whole(ms) => ms,
        Millis::Fractional(ms) => ms.round() as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(keystrokes: Vec<KeystrokeRecord>) -> RecordingDocument {
        RecordingDocument {
            recording_id: "rec-1".into(),
            start_timestamp: 1_000,
            end_timestamp: 4_000,
            keyboard_session_id: "in-1".into(),
            control_session_id: "mon-1".into(),
            keystrokes,
            audio_file: "recording_rec-1.webm".into(),
        }
    }

    #[test]
    fn test_key_records_use_flat_shape() {
        let record = KeystrokeRecord::from(&InputEvent::key_down("KeyA", 1_200));
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"timestamp": 1200, "key": "KeyA", "event_type": "keydown"})
        );
    }

    #[test]
    fn test_events_survive_storage() {
        let events = vec![
            InputEvent::key_down("KeyA", 1_200),
            InputEvent::PointerDown { t: 1_300, pos: 4 },
            InputEvent::PointerUp {
                t: 1_310,
                sel_start: Some(1),
                sel_end: None,
            },
            InputEvent::SelectDelta { t: 1_400, delta: -2 },
            InputEvent::key_up("KeyA", 1_500),
        ];
        let doc = document(events.iter().map(KeystrokeRecord::from).collect());
        let text = doc.to_json_pretty().unwrap();
        let loaded = RecordingDocument::from_json(&text).unwrap();
        assert_eq!(loaded, doc);
        assert_eq!(loaded.events(), events);
        assert_eq!(loaded.key_event_count(), 2);
        assert_eq!(loaded.duration_ms(), 3_000);
    }

    #[test]
    fn test_legacy_field_names() {
        let text = r#"{
            "recording_id": "old",
            "start_timestamp": 0,
            "end_timestamp": 10,
            "keyboard_session_id": "k",
            "control_session_id": "c",
            "keystrokes": [
                {"time": 12.6, "key": "a", "type": "down"},
                {"time": 40, "key": "a", "type": "up"},
                {"time": 41, "type": "scroll"}
            ],
            "audio_file": "recording_old.webm"
        }"#;
        let doc = RecordingDocument::from_json(text).unwrap();
        assert_eq!(doc.keystrokes[0].timestamp, 13);
        assert_eq!(
            doc.events(),
            vec![InputEvent::key_down("a", 13), InputEvent::key_up("a", 40)]
        );
    }

    #[test]
    fn test_incomplete_records_are_skipped() {
        let doc = document(vec![
            KeystrokeRecord::blank(5, "keydown"),
            KeystrokeRecord::blank(6, "pointerdown"),
        ]);
        assert!(doc.events().is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording_rec-1.json");
        let doc = document(vec![KeystrokeRecord::from(&InputEvent::key_down("KeyZ", 2))]);
        std::fs::write(&path, doc.to_json_pretty().unwrap()).unwrap();
        assert_eq!(RecordingDocument::load(&path).unwrap(), doc);
    }
}
