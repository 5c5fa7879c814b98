// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only
#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use kasca_protocol::AudioFrame;
use kasca_server::{Server, ServerConfig, ServerResult};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A server on an ephemeral port writing into a temporary directory.
pub struct TestServer {
    pub addr: SocketAddr,
    pub dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<ServerResult<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = ServerConfig {
            bind_addr: addr,
            recordings_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        configure(&mut config);

        let server = Server::new(config).await.expect("server");
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_with_shutdown(async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            dir,
            shutdown: Some(shutdown),
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn recording_path(&self, recording_id: &str) -> PathBuf {
        self.dir.path().join(format!("recording_{recording_id}.json"))
    }

    pub fn audio_path(&self, recording_id: &str) -> PathBuf {
        self.dir.path().join(format!("recording_{recording_id}.webm"))
    }

    /// Trigger graceful shutdown and wait for the server to finish.
    pub async fn shutdown(mut self) -> TempDir {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), &mut self.handle)
            .await
            .expect("server stops")
            .expect("server task")
            .expect("server run");
        self.dir
    }
}

/// Connect, retrying while the spawned server is still binding.
pub async fn connect(url: &str) -> Client {
    for _ in 0..100 {
        if let Ok((socket, _)) = tokio_tungstenite::connect_async(url).await {
            return socket;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("could not connect to {url}");
}

pub async fn send_json(client: &mut Client, value: Value) {
    client.send(WsMessage::Text(value.to_string())).await.expect("send");
}

pub async fn send_audio(
    client: &mut Client,
    recording_id: &str,
    keyboard_session_id: &str,
    payload: &[u8],
) {
    let frame = AudioFrame {
        recording_id: recording_id.to_string(),
        keyboard_session_id: keyboard_session_id.to_string(),
        payload: payload.to_vec(),
    }
    .encode()
    .expect("encode frame");
    client.send(WsMessage::Binary(frame)).await.expect("send audio");
}

/// Next JSON text frame, or `None` when the connection closed.
pub async fn try_recv_json(client: &mut Client, wait: Duration) -> Option<Value> {
    loop {
        let frame = match tokio::time::timeout(wait, client.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(_))) | Ok(None) | Err(_) => return None,
        };
        match frame {
            WsMessage::Text(text) => return Some(serde_json::from_str(&text).expect("json frame")),
            WsMessage::Close(_) => return None,
            _ => continue,
        }
    }
}

pub async fn recv_json(client: &mut Client) -> Value {
    try_recv_json(client, RECV_TIMEOUT).await.expect("expected a frame")
}

/// Skip frames until one of `kind` arrives.
pub async fn recv_type(client: &mut Client, kind: &str) -> Value {
    loop {
        let value = recv_json(client).await;
        if value["type"] == kind {
            return value;
        }
    }
}

/// Skip frames until a `client_list` satisfies `predicate`.
pub async fn recv_client_list(
    client: &mut Client,
    predicate: impl Fn(&[String]) -> bool,
) -> Vec<String> {
    loop {
        let value = recv_type(client, "client_list").await;
        let ids: Vec<String> = value["clients"]
            .as_array()
            .expect("clients array")
            .iter()
            .map(|c| c["session_id"].as_str().unwrap().to_string())
            .collect();
        if predicate(&ids) {
            return ids;
        }
    }
}

/// Open a keyboard connection and return it with its assigned session id.
pub async fn connect_keyboard(server: &TestServer) -> (Client, String) {
    let mut client = connect(&server.url("/ws/keyboard")).await;
    let assigned = recv_json(&mut client).await;
    assert_eq!(assigned["type"], "session_assigned");
    let id = assigned["session_id"].as_str().unwrap().to_string();
    (client, id)
}

/// Open a control connection, consuming `session_assigned` only.
pub async fn connect_control(server: &TestServer) -> (Client, String) {
    let mut client = connect(&server.url("/ws/control")).await;
    let assigned = recv_json(&mut client).await;
    assert_eq!(assigned["type"], "session_assigned");
    let id = assigned["session_id"].as_str().unwrap().to_string();
    (client, id)
}

pub async fn wait_for_file(path: &Path) {
    for _ in 0..250 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never appeared", path.display());
}

pub fn read_document(path: &Path) -> Value {
    let text = std::fs::read_to_string(path).expect("read document");
    serde_json::from_str(&text).expect("document json")
}
