// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

// kasca timeline reconstruction
//
// Turns the raw key/pointer event log captured during a recording into two
// step functions over playback time: the set of physically pressed keys and
// the text buffer (with cursor and selection) those keys produced.
//
// Everything here is a pure function of the sorted event log. Nothing reads
// the clock, so replaying the same log always yields the same snapshots.

pub mod event;
pub mod key_state;
pub mod keys;
pub mod normalize;
pub mod text_state;
pub mod timeline;

pub use event::{InputEvent, Timestamp, sorted};
pub use key_state::{PressedKeys, build_key_timeline};
pub use keys::{KeyAction, ModifierTracker, resolve_key};
pub use normalize::{KeyDirection, NormalizedKeyEvent, normalize_key_case, relative_key_events};
pub use text_state::{TextEditor, TextState, build_text_timeline};
pub use timeline::{Snapshot, Timeline};

/// Both reconstructions of one event log, sharing a base time.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub keys: Timeline<PressedKeys>,
    pub text: Timeline<TextState>,
}

impl Reconstruction {
    /// Sort `events` and rebuild both timelines relative to `base_time`.
    pub fn build(events: &[InputEvent], base_time: Timestamp) -> Self {
        let events = sorted(events);
        Self {
            keys: build_key_timeline(&events, base_time),
            text: build_text_timeline(&events, base_time),
        }
    }

    /// Rebuild using the earliest event as the base time.
    pub fn from_log(events: &[InputEvent]) -> Self {
        let base_time = events.iter().map(InputEvent::t).min().unwrap_or(0);
        Self::build(events, base_time)
    }

    /// Timestamp of the last event that changed either reconstruction.
    pub fn last_change(&self) -> Option<Timestamp> {
        let key_end = self.keys.snapshots().last().map(|s| s.time_offset);
        let text_end = self.text.snapshots().last().map(|s| s.time_offset);
        key_end.max(text_end).map(|offset| self.keys.base_time().saturating_add(offset))
    }
}
