// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Text buffer reconstruction
//!
//! Replays key presses and pointer gestures against an in-memory text
//! buffer. Cursor and selection bounds are character offsets, always kept
//! within `0..=len`.

use crate::event::{InputEvent, Timestamp};
use crate::keys::{KeyAction, ModifierTracker, resolve_key};
use crate::timeline::Timeline;

/// Observable text state at a point in time.
///
/// `selection_start == selection_end` means no selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextState {
    pub text: String,
    pub cursor: usize,
    pub selection_start: usize,
    pub selection_end: usize,
}

impl TextState {
    pub fn has_selection(&self) -> bool {
        self.selection_start != self.selection_end
    }

    pub fn selected_text(&self) -> String {
        self.text
            .chars()
            .skip(self.selection_start)
            .take(self.selection_end - self.selection_start)
            .collect()
    }
}

/// Mutable editor driven by the event stream.
#[derive(Debug, Clone, Default)]
pub struct TextEditor {
    chars: Vec<char>,
    cursor: usize,
    selection: (usize, usize),
    anchor: usize,
    modifiers: ModifierTracker,
}

impl TextEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &InputEvent) {
        match event {
            InputEvent::KeyDown { code, .. } => {
                let action = resolve_key(code, &self.modifiers);
                self.modifiers.observe(event);
                self.perform(action);
            }
            InputEvent::KeyUp { .. } => self.modifiers.observe(event),
            InputEvent::PointerDown { pos, .. } => {
                self.collapse_at(*pos);
            }
            InputEvent::PointerUp {
                sel_start,
                sel_end,
                ..
            } => match (*sel_start, *sel_end) {
                (Some(a), Some(b)) if a != b => {
                    let start = a.min(b).min(self.len());
                    let end = a.max(b).min(self.len());
                    self.selection = (start, end);
                    self.anchor = start;
                    self.cursor = end;
                }
                (Some(a), _) => self.collapse_at(a),
                (None, _) => self.collapse_at(self.cursor),
            },
            InputEvent::SelectDelta { delta, .. } => {
                let anchor = self.anchor.min(self.len());
                let target = (anchor as i64)
                    .saturating_add(*delta)
                    .clamp(0, self.len() as i64) as usize;
                self.cursor = target;
                self.selection = (anchor.min(target), anchor.max(target));
            }
        }
    }

    pub fn state(&self) -> TextState {
        TextState {
            text: self.chars.iter().collect(),
            cursor: self.cursor,
            selection_start: self.selection.0,
            selection_end: self.selection.1,
        }
    }

    fn perform(&mut self, action: KeyAction) {
        match action {
            KeyAction::Insert(c) => {
                self.delete_selection();
                self.chars.insert(self.cursor, c);
                self.collapse_at(self.cursor + 1);
            }
            KeyAction::Backspace => {
                if !self.delete_selection() && self.cursor > 0 {
                    self.chars.remove(self.cursor - 1);
                    self.collapse_at(self.cursor - 1);
                }
            }
            KeyAction::Delete => {
                if !self.delete_selection() && self.cursor < self.len() {
                    self.chars.remove(self.cursor);
                }
            }
            KeyAction::CursorLeft => self.collapse_at(self.cursor.saturating_sub(1)),
            KeyAction::CursorRight => self.collapse_at(self.cursor + 1),
            KeyAction::Ignore => {}
        }
    }

    /// Remove the selected range, leaving the cursor at its start.
    /// Returns false when there was nothing selected.
    fn delete_selection(&mut self) -> bool {
        let (start, end) = self.selection;
        if start == end {
            return false;
        }
        self.chars.drain(start..end);
        self.collapse_at(start);
        true
    }

    fn collapse_at(&mut self, pos: usize) {
        let pos = pos.min(self.len());
        self.cursor = pos;
        self.anchor = pos;
        self.selection = (pos, pos);
    }

    fn len(&self) -> usize {
        self.chars.len()
    }
}

/// Build the text timeline from a log already sorted by timestamp.
pub fn build_text_timeline(events: &[InputEvent], base_time: Timestamp) -> Timeline<TextState> {
    let mut editor = TextEditor::new();
    let mut timeline = Timeline::new(base_time, editor.state());
    for event in events {
        editor.apply(event);
        timeline.record(event.t().saturating_sub(base_time), &editor.state());
    }
    timeline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_keys(codes: &[&str]) -> Vec<InputEvent> {
        codes
            .iter()
            .enumerate()
            .flat_map(|(i, code)| {
                let t = (i as i64) * 100;
                [InputEvent::key_down(*code, t), InputEvent::key_up(*code, t + 50)]
            })
            .collect()
    }

    fn replay(events: &[InputEvent]) -> TextState {
        let mut editor = TextEditor::new();
        for event in events {
            editor.apply(event);
        }
        editor.state()
    }

    #[test]
    fn test_typing_and_shift() {
        let mut events = vec![InputEvent::key_down("ShiftLeft", 0)];
        events.push(InputEvent::key_down("KeyH", 10));
        events.push(InputEvent::key_up("KeyH", 20));
        events.push(InputEvent::key_up("ShiftLeft", 30));
        events.push(InputEvent::key_down("KeyI", 40));
        events.push(InputEvent::key_down("Digit1", 50));

        let state = replay(&events);
        assert_eq!(state.text, "Hi1");
        assert_eq!(state.cursor, 3);
        assert!(!state.has_selection());
    }

    #[test]
    fn test_backspace_and_delete_clamp() {
        let state = replay(&type_keys(&["Backspace", "KeyA", "KeyB", "Backspace"]));
        assert_eq!(state.text, "a");
        assert_eq!(state.cursor, 1);

        let state = replay(&type_keys(&["KeyA", "Delete", "ArrowLeft", "Delete", "Delete"]));
        assert_eq!(state.text, "");
        assert_eq!(state.cursor, 0);
    }

    #[test]
    fn test_arrows_clamp_to_bounds() {
        let state = replay(&type_keys(&[
            "KeyA", "ArrowRight", "ArrowLeft", "ArrowLeft", "ArrowLeft", "KeyB",
        ]));
        assert_eq!(state.text, "ba");
        assert_eq!(state.cursor, 1);
    }

    #[test]
    fn test_enter_and_tab() {
        let state = replay(&type_keys(&["KeyA", "Enter", "Tab", "KeyB"]));
        assert_eq!(state.text, "a\n\tb");
    }

    #[test]
    fn test_pointer_selection_replaced_by_typing() {
        let mut events = type_keys(&["KeyA", "KeyB", "KeyC", "KeyD"]);
        events.push(InputEvent::PointerDown { t: 1_000, pos: 1 });
        events.push(InputEvent::PointerUp {
            t: 1_100,
            sel_start: Some(3),
            sel_end: Some(1),
        });
        let selected = replay(&events);
        assert_eq!(selected.selection_start, 1);
        assert_eq!(selected.selection_end, 3);
        assert_eq!(selected.cursor, 3);
        assert_eq!(selected.selected_text(), "bc");

        events.push(InputEvent::key_down("KeyX", 1_200));
        let state = replay(&events);
        assert_eq!(state.text, "axd");
        assert_eq!(state.cursor, 2);
        assert!(!state.has_selection());
    }

    #[test]
    fn test_backspace_deletes_selection() {
        let mut events = type_keys(&["KeyA", "KeyB", "KeyC"]);
        events.push(InputEvent::PointerUp {
            t: 1_000,
            sel_start: Some(0),
            sel_end: Some(2),
        });
        events.push(InputEvent::key_down("Backspace", 1_100));
        let state = replay(&events);
        assert_eq!(state.text, "c");
        assert_eq!(state.cursor, 0);
    }

    #[test]
    fn test_pointer_up_without_bounds_collapses() {
        let mut events = type_keys(&["KeyA", "KeyB", "KeyC"]);
        events.push(InputEvent::PointerDown { t: 1_000, pos: 1 });
        events.push(InputEvent::SelectDelta { t: 1_050, delta: 2 });
        events.push(InputEvent::PointerUp {
            t: 1_100,
            sel_start: None,
            sel_end: None,
        });
        let state = replay(&events);
        assert_eq!(state.cursor, 3);
        assert!(!state.has_selection());

        let mut events = type_keys(&["KeyA", "KeyB", "KeyC"]);
        events.push(InputEvent::PointerUp {
            t: 1_100,
            sel_start: Some(2),
            sel_end: Some(2),
        });
        let state = replay(&events);
        assert_eq!(state.cursor, 2);
        assert!(!state.has_selection());
    }

    #[test]
    fn test_select_delta_relative_to_anchor() {
        let mut events = type_keys(&["KeyA", "KeyB", "KeyC", "KeyD", "KeyE"]);
        events.push(InputEvent::PointerDown { t: 1_000, pos: 3 });
        events.push(InputEvent::SelectDelta { t: 1_010, delta: -2 });
        let state = replay(&events);
        assert_eq!(state.cursor, 1);
        assert_eq!((state.selection_start, state.selection_end), (1, 3));

        events.push(InputEvent::SelectDelta { t: 1_020, delta: 99 });
        let state = replay(&events);
        assert_eq!(state.cursor, 5);
        assert_eq!((state.selection_start, state.selection_end), (3, 5));

        events.push(InputEvent::SelectDelta {
            t: 1_030,
            delta: i64::MIN,
        });
        let state = replay(&events);
        assert_eq!(state.cursor, 0);
        assert_eq!((state.selection_start, state.selection_end), (0, 3));
    }

    #[test]
    fn test_pointer_down_clamps_position() {
        let mut events = type_keys(&["KeyA"]);
        events.push(InputEvent::PointerDown { t: 1_000, pos: 40 });
        assert_eq!(replay(&events).cursor, 1);
    }

    #[test]
    fn test_timeline_records_only_changes() {
        let events = type_keys(&["ShiftLeft", "KeyA", "ArrowLeft", "ArrowLeft"]);
        let timeline = build_text_timeline(&events, 0);

        // ShiftLeft changes nothing, the second ArrowLeft is clamped at 0.
        let offsets: Vec<_> = timeline.snapshots().iter().map(|s| s.time_offset).collect();
        assert_eq!(offsets, vec![100, 200]);
        assert_eq!(timeline.state_at(150).text, "a");
        assert_eq!(timeline.state_at(250).cursor, 0);
    }
}
