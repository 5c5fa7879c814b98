// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Run-length compressed step function over playback time

use crate::event::Timestamp;

/// A state that became current at `time_offset` milliseconds after the base time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<S> {
    pub time_offset: i64,
    pub state: S,
}

/// Sequence of snapshots, strictly increasing in `time_offset`, where each
/// snapshot differs from the one before it.
///
/// Queries are right-continuous: the state at `t` is the latest snapshot at
/// or before `t`, or the initial state when `t` precedes every snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline<S> {
    base_time: Timestamp,
    initial: S,
    snapshots: Vec<Snapshot<S>>,
}

impl<S: Clone + PartialEq> Timeline<S> {
    pub fn new(base_time: Timestamp, initial: S) -> Self {
        Self {
            base_time,
            initial,
            snapshots: Vec::new(),
        }
    }

    /// Record `state` as current from `time_offset` on.
    ///
    /// Offsets must be fed in non-decreasing order. A state equal to the
    /// current one is dropped. When several changes land on the same offset
    /// only the last one is kept, and it is dropped again if it merely
    /// restores the state that preceded that offset.
    pub fn record(&mut self, time_offset: i64, state: &S) {
        let same_offset = self
            .snapshots
            .last()
            .is_some_and(|last| last.time_offset == time_offset);

        if same_offset {
            let len = self.snapshots.len();
            let previous = if len >= 2 {
                &self.snapshots[len - 2].state
            } else {
                &self.initial
            };
            if previous == state {
                self.snapshots.pop();
            } else {
                self.snapshots[len - 1].state = state.clone();
            }
            return;
        }

        if self.current() != state {
            self.snapshots.push(Snapshot {
                time_offset,
                state: state.clone(),
            });
        }
    }

    /// State after the last recorded change.
    pub fn current(&self) -> &S {
        self.snapshots.last().map(|s| &s.state).unwrap_or(&self.initial)
    }

    /// Index of the snapshot in effect at absolute time `t`.
    pub fn index_at(&self, t: Timestamp) -> Option<usize> {
        let offset = t.saturating_sub(self.base_time);
        let idx = self.snapshots.partition_point(|s| s.time_offset <= offset);
        idx.checked_sub(1)
    }

    /// State in effect at absolute time `t`.
    pub fn state_at(&self, t: Timestamp) -> &S {
        match self.index_at(t) {
            Some(idx) => &self.snapshots[idx].state,
            None => &self.initial,
        }
    }

    /// State in effect `offset` milliseconds after the base time.
    pub fn state_at_offset(&self, offset: i64) -> &S {
        self.state_at(self.base_time.saturating_add(offset))
    }

    pub fn base_time(&self) -> Timestamp {
        self.base_time
    }

    pub fn initial(&self) -> &S {
        &self.initial
    }

    pub fn snapshots(&self) -> &[Snapshot<S>] {
        &self.snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets<S: Clone + PartialEq>(timeline: &Timeline<S>) -> Vec<i64> {
        timeline.snapshots().iter().map(|s| s.time_offset).collect()
    }

    #[test]
    fn test_unchanged_state_is_not_recorded() {
        let mut timeline = Timeline::new(0, 0u32);
        timeline.record(1, &0);
        timeline.record(2, &5);
        timeline.record(3, &5);
        timeline.record(4, &6);
        assert_eq!(offsets(&timeline), vec![2, 4]);
    }

    #[test]
    fn test_same_offset_keeps_last_state() {
        let mut timeline = Timeline::new(0, 0u32);
        timeline.record(10, &1);
        timeline.record(10, &2);
        assert_eq!(timeline.snapshots().len(), 1);
        assert_eq!(timeline.state_at(10), &2);
    }

    #[test]
    fn test_same_offset_reverting_change_is_dropped() {
        let mut timeline = Timeline::new(0, 0u32);
        timeline.record(5, &7);
        timeline.record(10, &1);
        timeline.record(10, &7);
        assert_eq!(offsets(&timeline), vec![5]);

        let mut timeline = Timeline::new(0, 0u32);
        timeline.record(10, &1);
        timeline.record(10, &0);
        assert!(timeline.snapshots().is_empty());
    }

    #[test]
    fn test_right_continuous_queries() {
        let mut timeline = Timeline::new(1_000, "");
        timeline.record(0, &"a");
        timeline.record(50, &"ab");

        assert_eq!(timeline.state_at(999), &"");
        assert_eq!(timeline.state_at(1_000), &"a");
        assert_eq!(timeline.state_at(1_049), &"a");
        assert_eq!(timeline.state_at(1_050), &"ab");
        assert_eq!(timeline.state_at(i64::MAX), &"ab");
        assert_eq!(timeline.state_at(i64::MIN), &"");
        assert_eq!(timeline.state_at_offset(50), &"ab");
    }

    #[test]
    fn test_index_at() {
        let mut timeline = Timeline::new(0, 0u8);
        timeline.record(10, &1);
        timeline.record(20, &2);
        assert_eq!(timeline.index_at(9), None);
        assert_eq!(timeline.index_at(10), Some(0));
        assert_eq!(timeline.index_at(25), Some(1));
    }
}
