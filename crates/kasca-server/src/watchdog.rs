// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Periodic finalization of recordings that stopped receiving data

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::state::AppState;

/// Spawn the idle watchdog, or `None` when the timeout is disabled.
pub fn spawn_idle_watchdog(state: AppState) -> Option<JoinHandle<()>> {
    let timeout = state.config.idle_recording_timeout()?;
    let period = state.config.idle_check_interval();
    info!(
        timeout_secs = timeout.as_secs(),
        check_secs = period.as_secs(),
        "Idle recording watchdog enabled"
    );
    Some(tokio::spawn(run_idle_watchdog(state, timeout, period)))
}

async fn run_idle_watchdog(state: AppState, timeout: Duration, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        for done in state.recordings.reap_idle(timeout).await {
            state.announce_stopped(&done).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use kasca_protocol::ServerMessage;
    use tokio::sync::mpsc;

    #[test]
    fn test_disabled_when_timeout_is_zero() {
        let state = AppState::new(ServerConfig {
            idle_recording_timeout_secs: 0,
            ..ServerConfig::default()
        });
        assert!(spawn_idle_watchdog(state).is_none());
    }

    #[tokio::test]
    async fn test_idle_recording_is_finalized_and_announced() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(ServerConfig {
            recordings_dir: dir.path().to_path_buf(),
            idle_recording_timeout_secs: 1,
            idle_check_interval_secs: 1,
            ..ServerConfig::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.roster.add_monitor("mon-1", tx).await;
        state.roster.add_input("in-1").await;
        state.recordings.start("rec-1", "in-1", "mon-1").await.unwrap();

        let watchdog = spawn_idle_watchdog(state.clone()).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Some(ServerMessage::RecordingStopped { recording_id, .. }) => {
                        break recording_id;
                    }
                    Some(_) => continue,
                    None => panic!("monitor queue closed"),
                }
            }
        })
        .await
        .unwrap();
        watchdog.abort();

        assert_eq!(stopped, "rec-1");
        assert_eq!(state.recordings.active_count().await, 0);
        assert!(dir.path().join("recording_rec-1.json").exists());
    }
}
