// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Pressed-key reconstruction

use std::collections::BTreeSet;

use crate::event::{InputEvent, Timestamp};
use crate::timeline::Timeline;

/// Codes held down at a point in time, in a stable order.
pub type PressedKeys = BTreeSet<String>;

/// Build the pressed-key timeline from a log already sorted by timestamp.
///
/// Pointer events do not affect the pressed set. A key-up for a code that
/// is not held is a no-op.
pub fn build_key_timeline(events: &[InputEvent], base_time: Timestamp) -> Timeline<PressedKeys> {
    let mut pressed = PressedKeys::new();
    let mut timeline = Timeline::new(base_time, PressedKeys::new());

    for event in events {
        let changed = match event {
            InputEvent::KeyDown { code, .. } => pressed.insert(code.clone()),
            InputEvent::KeyUp { code, .. } => pressed.remove(code),
            _ => false,
        };
        if changed {
            timeline.record(event.t().saturating_sub(base_time), &pressed);
        }
    }

    timeline
}
