// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Recording lifecycle for kasca
//!
//! [`RecordingRegistry`] binds one keyboard session to one control-initiated
//! recording, buffers its input events, streams its audio through an ordered
//! [`AudioSink`] and, on stop or disconnect, repairs the audio container with
//! an [`AudioFinalizer`] before persisting everything through a
//! [`RecordingStore`].

pub mod ebml;
pub mod error;
pub mod finalizer;
pub mod registry;
pub mod sink;
pub mod store;

pub use error::{FinalizeError, RecorderError, RecorderResult};
pub use finalizer::{
    AudioFinalizer, EbmlDurationPatcher, FfmpegRemuxer, FinalizerKind, NoopFinalizer,
};
pub use registry::{
    FinalizeReason, FinalizedRecording, RecordingRegistry, RecordingState, StartedRecording,
};
pub use sink::{AudioSink, SinkOptions, SinkReport};
pub use store::{DatasetSummary, RecordingStore, validate_recording_id};
