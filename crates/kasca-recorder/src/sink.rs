// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Ordered per-recording audio writer
//!
//! Each recording owns one writer task fed by a bounded FIFO channel. Chunks
//! are written strictly in enqueue order whatever the per-chunk processing
//! latency, and [`AudioSink::finish`] resolves only once every chunk queued
//! before it has reached the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{RecorderError, RecorderResult};

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Configuration for an audio sink.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    /// Chunks that may wait in the queue before `append` applies backpressure.
    pub queue_capacity: usize,
    /// Upper bound of a random delay applied before each write. Zero in
    /// production; used to exercise ordering under jitter.
    pub max_chunk_delay: Duration,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_chunk_delay: Duration::ZERO,
        }
    }
}

impl SinkOptions {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_max_chunk_delay(mut self, delay: Duration) -> Self {
        self.max_chunk_delay = delay;
        self
    }
}

/// What the writer task did before it was finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub chunks_written: u64,
    pub bytes_written: u64,
    pub failed_writes: u64,
    /// Chunks discarded because an earlier write failed.
    pub dropped_chunks: u64,
}

enum SinkCommand {
    Chunk(Vec<u8>),
    Finish(oneshot::Sender<SinkReport>),
}

/// Handle to a recording's writer task.
#[derive(Debug, Clone)]
pub struct AudioSink {
    recording_id: String,
    path: PathBuf,
    tx: mpsc::Sender<SinkCommand>,
    failed: Arc<AtomicBool>,
}

impl AudioSink {
    /// Create the audio file and start its writer task. An existing file is
    /// never reopened.
    pub async fn open(
        recording_id: &str,
        path: &Path,
        options: &SinkOptions,
    ) -> RecorderResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let failed = Arc::new(AtomicBool::new(false));

        debug!(
            recording_id,
            path = %path.display(),
            queue_capacity = options.queue_capacity,
            "Opened audio sink"
        );

        let writer = Writer {
            recording_id: recording_id.to_string(),
            file,
            max_delay: options.max_chunk_delay,
            failed: failed.clone(),
            report: SinkReport::default(),
        };
        tokio::spawn(writer.run(rx));

        Ok(Self {
            recording_id: recording_id.to_string(),
            path: path.to_path_buf(),
            tx,
            failed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a chunk behind every chunk queued before it.
    ///
    /// Fails once a write to the file has failed, since later chunks would
    /// leave a gap in the container.
    pub async fn append(&self, chunk: Vec<u8>) -> RecorderResult<()> {
        if self.failed.load(Ordering::Acquire) {
            return Err(RecorderError::SinkFailed(self.recording_id.clone()));
        }
        self.tx
            .send(SinkCommand::Chunk(chunk))
            .await
            .map_err(|_| RecorderError::SinkClosed(self.recording_id.clone()))
    }

    /// Drain the queue, flush the file and stop the writer task.
    pub async fn finish(self) -> RecorderResult<SinkReport> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Finish(done_tx))
            .await
            .map_err(|_| RecorderError::SinkClosed(self.recording_id.clone()))?;
        done_rx
            .await
            .map_err(|_| RecorderError::SinkClosed(self.recording_id.clone()))
    }
}

struct Writer {
    recording_id: String,
    file: File,
    max_delay: Duration,
    failed: Arc<AtomicBool>,
    report: SinkReport,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::Receiver<SinkCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                SinkCommand::Chunk(bytes) => self.write_chunk(bytes).await,
                SinkCommand::Finish(done) => {
                    // Chunks that were already queued when the recording was
                    // finalized still belong to it.
                    rx.close();
                    let mut waiters = vec![done];
                    while let Some(late) = rx.recv().await {
                        match late {
                            SinkCommand::Chunk(bytes) => self.write_chunk(bytes).await,
                            SinkCommand::Finish(other) => waiters.push(other),
                        }
                    }
                    self.close().await;
                    for waiter in waiters {
                        let _ = waiter.send(self.report.clone());
                    }
                    return;
                }
            }
        }

        // Every handle dropped without finish; keep what landed.
        let _ = self.file.flush().await;
    }

    async fn write_chunk(&mut self, bytes: Vec<u8>) {
        if self.failed.load(Ordering::Acquire) {
            self.report.dropped_chunks += 1;
            return;
        }

        if !self.max_delay.is_zero() {
            let delay = {
                let max_ms = self.max_delay.as_millis() as u64;
                rand::thread_rng().gen_range(0..=max_ms)
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match self.file.write_all(&bytes).await {
            Ok(()) => {
                self.report.chunks_written += 1;
                self.report.bytes_written += bytes.len() as u64;
                trace!(recording_id = %self.recording_id, len = bytes.len(), "Wrote audio chunk");
            }
            Err(err) => {
                self.report.failed_writes += 1;
                self.failed.store(true, Ordering::Release);
                warn!(
                    recording_id = %self.recording_id,
                    error = %err,
                    "Audio chunk write failed, discarding the rest of the stream"
                );
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.file.flush().await {
            warn!(recording_id = %self.recording_id, error = %err, "Audio flush failed");
        }
        if let Err(err) = self.file.sync_all().await {
            warn!(recording_id = %self.recording_id, error = %err, "Audio sync failed");
        }
        debug!(
            recording_id = %self.recording_id,
            chunks = self.report.chunks_written,
            bytes = self.report.bytes_written,
            dropped = self.report.dropped_chunks,
            "Audio sink finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunks_land_in_enqueue_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordered.webm");
        let options = SinkOptions::default()
            .with_queue_capacity(4)
            .with_max_chunk_delay(Duration::from_millis(5));
        let sink = AudioSink::open("rec-1", &path, &options).await.unwrap();

        let mut expected = Vec::new();
        for i in 0u8..40 {
            let chunk = vec![i; (i as usize % 7) + 1];
            expected.extend_from_slice(&chunk);
            sink.append(chunk).await.unwrap();
        }
        let report = sink.finish().await.unwrap();

        assert_eq!(report.chunks_written, 40);
        assert_eq!(report.bytes_written, expected.len() as u64);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_finish_with_no_chunks_leaves_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.webm");
        let sink = AudioSink::open("rec-2", &path, &SinkOptions::default())
            .await
            .unwrap();
        let report = sink.finish().await.unwrap();
        assert_eq!(report, SinkReport::default());
        assert!(tokio::fs::read(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_after_finish_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("closed.webm");
        let sink = AudioSink::open("rec-3", &path, &SinkOptions::default())
            .await
            .unwrap();
        let late = sink.clone();
        sink.finish().await.unwrap();

        // Writer task is gone once finish resolved.
        assert!(matches!(
            late.append(vec![1, 2, 3]).await,
            Err(RecorderError::SinkClosed(id)) if id == "rec-3"
        ));
    }

    #[tokio::test]
    async fn test_open_never_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.webm");
        std::fs::write(&path, b"earlier take").unwrap();

        let err = AudioSink::open("rec-4", &path, &SinkOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecorderError::Io(ref io) if io.kind() == std::io::ErrorKind::AlreadyExists
        ));
        assert_eq!(std::fs::read(&path).unwrap(), b"earlier take");
    }

    #[tokio::test]
    async fn test_chunk_queued_behind_finish_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.webm");
        let sink = AudioSink::open("rec-5", &path, &SinkOptions::default())
            .await
            .unwrap();

        let (done_tx, done_rx) = oneshot::channel();
        sink.tx.send(SinkCommand::Chunk(b"early".to_vec())).await.unwrap();
        sink.tx.send(SinkCommand::Finish(done_tx)).await.unwrap();
        sink.tx.send(SinkCommand::Chunk(b"late".to_vec())).await.unwrap();

        let report = done_rx.await.unwrap();
        assert_eq!(report.chunks_written, 2);
        assert_eq!(std::fs::read(&path).unwrap(), b"earlylate");

        assert!(matches!(
            sink.append(b"after".to_vec()).await,
            Err(RecorderError::SinkClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_write_stops_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readonly.webm");
        std::fs::write(&path, b"").unwrap();

        // A read-only handle makes every write fail.
        let (tx, rx) = mpsc::channel(8);
        let failed = Arc::new(AtomicBool::new(false));
        let writer = Writer {
            recording_id: "rec-6".to_string(),
            file: File::open(&path).await.unwrap(),
            max_delay: Duration::ZERO,
            failed: failed.clone(),
            report: SinkReport::default(),
        };
        tokio::spawn(writer.run(rx));
        let sink = AudioSink {
            recording_id: "rec-6".to_string(),
            path: path.clone(),
            tx,
            failed,
        };

        for chunk in [b"one", b"two", b"six"] {
            sink.tx.send(SinkCommand::Chunk(chunk.to_vec())).await.unwrap();
        }
        let late = sink.clone();
        let report = sink.finish().await.unwrap();

        assert_eq!(report.failed_writes, 1);
        assert_eq!(report.chunks_written + report.failed_writes + report.dropped_chunks, 3);
        assert!(matches!(
            late.append(b"more".to_vec()).await,
            Err(RecorderError::SinkFailed(id)) if id == "rec-6"
        ));
        assert!(std::fs::read(&path).unwrap().is_empty());
    }
}
