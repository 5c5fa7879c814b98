// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Event log normalization for downstream datasets

use serde::{Deserialize, Serialize};

use crate::event::InputEvent;
use crate::keys::is_shift;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyDirection {
    Down,
    Up,
}

/// A key event with its time in seconds since the first event of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedKeyEvent {
    pub time: f64,
    pub code: String,
    #[serde(rename = "type")]
    pub direction: KeyDirection,
}

/// Key events of `events` (in log order) relative to the first event.
///
/// The first event of the log sets time zero even when it is a pointer
/// event, so key times line up with the audio that started with the log.
pub fn relative_key_events(events: &[InputEvent]) -> Vec<NormalizedKeyEvent> {
    let Some(base) = events.first().map(InputEvent::t) else {
        return Vec::new();
    };

    events
        .iter()
        .filter_map(|event| {
            let (code, direction) = match event {
                InputEvent::KeyDown { code, .. } => (code, KeyDirection::Down),
                InputEvent::KeyUp { code, .. } => (code, KeyDirection::Up),
                _ => return None,
            };
            Some(NormalizedKeyEvent {
                time: event.t().saturating_sub(base) as f64 / 1000.0,
                code: code.clone(),
                direction,
            })
        })
        .collect()
}

/// Lowercase single-letter key codes pressed while no Shift key is held.
///
/// Older clients logged the produced character instead of the physical
/// code, so an unshifted `A` means the `a` key.
pub fn normalize_key_case(events: &mut [InputEvent]) {
    let mut shift_held: Vec<String> = Vec::new();

    for event in events.iter_mut() {
        let (code, is_down) = match event {
            InputEvent::KeyDown { code, .. } => (code, true),
            InputEvent::KeyUp { code, .. } => (code, false),
            _ => continue,
        };

        let mut chars = code.chars();
        let single_letter =
            matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic());
        if single_letter && shift_held.is_empty() {
            *code = code.to_lowercase();
        }

        if is_shift(code) {
            if is_down {
                if !shift_held.contains(code) {
                    shift_held.push(code.clone());
                }
            } else {
                shift_held.retain(|held| held.as_str() != code.as_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_key_events() {
        let events = vec![
            InputEvent::PointerDown { t: 1_000, pos: 0 },
            InputEvent::key_down("KeyA", 1_250),
            InputEvent::key_up("KeyA", 1_500),
        ];
        let rows = relative_key_events(&events);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].time, 0.25);
        assert_eq!(rows[0].direction, KeyDirection::Down);
        assert_eq!(rows[1].time, 0.5);

        let json = serde_json::to_value(&rows[1]).unwrap();
        assert_eq!(json["type"], "up");
        assert_eq!(json["code"], "KeyA");
    }

    #[test]
    fn test_relative_key_events_empty() {
        assert!(relative_key_events(&[]).is_empty());
    }

    #[test]
    fn test_normalize_key_case() {
        let mut events = vec![
            InputEvent::key_down("A", 0),
            InputEvent::key_up("A", 1),
            InputEvent::key_down("Shift", 2),
            InputEvent::key_down("B", 3),
            InputEvent::key_up("Shift", 4),
            InputEvent::key_down("C", 5),
            InputEvent::key_down("Enter", 6),
        ];
        normalize_key_case(&mut events);
        let codes: Vec<_> = events.iter().filter_map(InputEvent::code).collect();
        assert_eq!(codes, vec!["a", "a", "Shift", "B", "Shift", "c", "Enter"]);
    }
}
