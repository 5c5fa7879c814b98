// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Input events as captured from a keyboard session

/// Milliseconds since the Unix epoch, as stamped by the input client.
pub type Timestamp = i64;

/// A single key or pointer event.
///
/// Key codes are physical codes (`KeyA`, `ShiftLeft`, `Backspace`, ...).
/// Pointer positions and selection bounds are character offsets into the
/// edited text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown {
        code: String,
        t: Timestamp,
    },
    KeyUp {
        code: String,
        t: Timestamp,
    },
    PointerDown {
        t: Timestamp,
        pos: usize,
    },
    PointerUp {
        t: Timestamp,
        sel_start: Option<usize>,
        sel_end: Option<usize>,
    },
    SelectDelta {
        t: Timestamp,
        delta: i64,
    },
}

impl InputEvent {
    pub fn key_down(code: impl Into<String>, t: Timestamp) -> Self {
        InputEvent::KeyDown {
            code: code.into(),
            t,
        }
    }

    pub fn key_up(code: impl Into<String>, t: Timestamp) -> Self {
        InputEvent::KeyUp {
            code: code.into(),
            t,
        }
    }

    pub fn t(&self) -> Timestamp {
        match self {
            InputEvent::KeyDown { t, .. }
            | InputEvent::KeyUp { t, .. }
            | InputEvent::PointerDown { t, .. }
            | InputEvent::PointerUp { t, .. }
            | InputEvent::SelectDelta { t, .. } => *t,
        }
    }

    /// Key code for key events, `None` for pointer events.
    pub fn code(&self) -> Option<&str> {
        match self {
            InputEvent::KeyDown { code, .. } | InputEvent::KeyUp { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_key(&self) -> bool {
        self.code().is_some()
    }
}

/// Copy of `events` ordered by timestamp.
///
/// The sort is stable: events sharing a timestamp keep their arrival order,
/// which keeps reconstruction deterministic for the same log.
pub fn sorted(events: &[InputEvent]) -> Vec<InputEvent> {
    let mut events = events.to_vec();
    events.sort_by_key(InputEvent::t);
    events
}
