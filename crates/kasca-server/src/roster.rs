// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Live keyboard sessions and the monitors watching them
//!
//! Every roster change and every fan-out happens under one lock, so each
//! monitor observes `client_list` messages in the order the roster changed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use kasca_protocol::{ClientInfo, ServerMessage};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

/// Outbound queue of one monitor connection.
pub type MonitorSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Default)]
struct RosterInner {
    inputs: HashMap<String, DateTime<Utc>>,
    monitors: HashMap<String, MonitorSender>,
}

impl RosterInner {
    fn client_list(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self
            .inputs
            .iter()
            .map(|(session_id, connected_at)| ClientInfo {
                session_id: session_id.clone(),
                connected_at: *connected_at,
            })
            .collect();
        clients.sort_by(|a, b| {
            a.connected_at
                .cmp(&b.connected_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        clients
    }

    /// Best effort: a monitor whose connection is gone simply misses it.
    fn broadcast(&self, message: &ServerMessage) {
        for (session_id, tx) in &self.monitors {
            if tx.send(message.clone()).is_err() {
                trace!(%session_id, "Dropped broadcast to closed monitor");
            }
        }
    }

    fn broadcast_client_list(&self) {
        let message = ServerMessage::ClientList {
            clients: self.client_list(),
        };
        self.broadcast(&message);
    }
}

#[derive(Default)]
pub struct Roster {
    inner: Mutex<RosterInner>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a keyboard session and tell every monitor.
    pub async fn add_input(&self, session_id: &str) -> ClientInfo {
        let connected_at = Utc::now();
        let mut inner = self.inner.lock().await;
        inner.inputs.insert(session_id.to_string(), connected_at);
        inner.broadcast_client_list();
        ClientInfo {
            session_id: session_id.to_string(),
            connected_at,
        }
    }

    /// Returns `false` when the session was not registered.
    pub async fn remove_input(&self, session_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.inputs.remove(session_id).is_some();
        if removed {
            inner.broadcast_client_list();
        }
        removed
    }

    pub async fn contains_input(&self, session_id: &str) -> bool {
        self.inner.lock().await.inputs.contains_key(session_id)
    }

    /// Keyboard sessions ordered by connection time.
    pub async fn client_list(&self) -> Vec<ClientInfo> {
        self.inner.lock().await.client_list()
    }

    /// Register a monitor, queueing the current roster snapshot to it first
    /// so no later broadcast can overtake it.
    pub async fn add_monitor(&self, session_id: &str, tx: MonitorSender) {
        let mut inner = self.inner.lock().await;
        let snapshot = ServerMessage::ClientList {
            clients: inner.client_list(),
        };
        if tx.send(snapshot).is_err() {
            debug!(%session_id, "Monitor closed before registration");
            return;
        }
        inner.monitors.insert(session_id.to_string(), tx);
    }

    pub async fn remove_monitor(&self, session_id: &str) -> bool {
        self.inner.lock().await.monitors.remove(session_id).is_some()
    }

    /// Queue `message` for one monitor. `false` if it is gone.
    pub async fn send_to_monitor(&self, session_id: &str, message: ServerMessage) -> bool {
        let inner = self.inner.lock().await;
        match inner.monitors.get(session_id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    pub async fn input_count(&self) -> usize {
        self.inner.lock().await.inputs.len()
    }

    pub async fn monitor_count(&self) -> usize {
        self.inner.lock().await.monitors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn listed(message: &ServerMessage) -> Vec<String> {
        match message {
            ServerMessage::ClientList { clients } => {
                clients.iter().map(|c| c.session_id.clone()).collect()
            }
            other => panic!("expected client_list, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_monitor_gets_snapshot_then_updates() {
        let roster = Roster::new();
        roster.add_input("in-1").await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        roster.add_monitor("mon-1", tx).await;
        roster.add_input("in-2").await;
        assert!(roster.remove_input("in-1").await);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 3);
        assert_eq!(listed(&messages[0]), vec!["in-1"]);
        assert_eq!(listed(&messages[1]), vec!["in-1", "in-2"]);
        assert_eq!(listed(&messages[2]), vec!["in-2"]);
    }

    #[tokio::test]
    async fn test_removing_unknown_input_is_silent() {
        let roster = Roster::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        roster.add_monitor("mon-1", tx).await;
        drain(&mut rx);

        assert!(!roster.remove_input("ghost").await);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_dead_monitor_does_not_block_broadcast() {
        let roster = Roster::new();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        roster.add_monitor("dead", dead_tx).await;
        roster.add_monitor("live", live_tx).await;
        drop(dead_rx);
        drain(&mut live_rx);

        roster.add_input("in-1").await;
        assert_eq!(drain(&mut live_rx).len(), 1);
        assert!(!roster.send_to_monitor("dead", ServerMessage::error("x", None)).await);
        assert!(roster.send_to_monitor("live", ServerMessage::error("x", None)).await);
        assert!(!roster.send_to_monitor("nobody", ServerMessage::error("x", None)).await);
    }

    #[tokio::test]
    async fn test_monitors_do_not_appear_in_roster() {
        let roster = Roster::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        roster.add_monitor("mon-1", tx).await;
        roster.add_input("in-1").await;

        assert!(roster.contains_input("in-1").await);
        assert!(!roster.contains_input("mon-1").await);
        assert_eq!(roster.input_count().await, 1);
        assert_eq!(roster.monitor_count().await, 1);

        assert!(roster.remove_monitor("mon-1").await);
        assert_eq!(roster.monitor_count().await, 0);
        assert_eq!(roster.client_list().await.len(), 1);
    }
}
