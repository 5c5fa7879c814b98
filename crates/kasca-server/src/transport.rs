// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! WebSocket endpoints for keyboard (`/ws/keyboard`) and control
//! (`/ws/control`) clients
//!
//! Keyboard sockets only ever receive `session_assigned`, so they are driven
//! directly. Control sockets get a per-connection queue drained by a forward
//! task; replies and fan-out from other connections share that queue and
//! therefore keep their relative order.

use axum::{
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use kasca_protocol::{AudioFrame, InputMessage, MonitorCommand, ServerMessage};
use kasca_recorder::{FinalizeReason, RecorderError};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::roster::MonitorSender;
use crate::state::AppState;

pub async fn keyboard_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_keyboard_socket(socket, state))
}

pub async fn control_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_control_socket(socket, state))
}

fn encode(message: &ServerMessage) -> Option<WsMessage> {
    match message.to_json() {
        Ok(text) => Some(WsMessage::Text(text)),
        Err(err) => {
            warn!(error = %err, "Failed to encode server message");
            None
        }
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    message: &ServerMessage,
) -> Result<(), ()> {
    let Some(frame) = encode(message) else {
        return Ok(());
    };
    sender.send(frame).await.map_err(|_| ())
}

async fn handle_keyboard_socket(mut socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    state.roster.add_input(&session_id).await;
    info!(%session_id, "Keyboard client connected");

    let assigned = ServerMessage::SessionAssigned {
        session_id: session_id.clone(),
    };
    if let Some(frame) = encode(&assigned) {
        if socket.send(frame).await.is_err() {
            debug!(%session_id, "Keyboard client left before session assignment");
            on_keyboard_disconnect(&state, &session_id).await;
            return;
        }
    }

    while let Some(frame) = socket.recv().await {
        match frame {
            Ok(WsMessage::Text(text)) => handle_input_text(&state, &session_id, &text).await,
            Ok(WsMessage::Binary(bytes)) => {
                debug!(
                    %session_id,
                    len = bytes.len(),
                    "Ignoring binary frame from keyboard client"
                );
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
            Err(err) => {
                debug!(%session_id, error = %err, "Keyboard socket error");
                break;
            }
        }
    }

    on_keyboard_disconnect(&state, &session_id).await;
}

async fn handle_input_text(state: &AppState, session_id: &str, text: &str) {
    let message = match InputMessage::parse(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(%session_id, error = %err, "Dropping malformed input message");
            return;
        }
    };
    if let Some(claimed) = message.session_id() {
        if claimed != session_id {
            debug!(
                %session_id,
                claimed,
                "Input message names another session, attributing to its connection"
            );
        }
    }

    match state.recordings.record_event(session_id, message.into()).await {
        Some(recording_id) => trace!(%session_id, %recording_id, "Input event recorded"),
        None => trace!(%session_id, "Input event outside a recording"),
    }
}

async fn on_keyboard_disconnect(state: &AppState, session_id: &str) {
    state.roster.remove_input(session_id).await;
    info!(%session_id, "Keyboard client disconnected");

    match state
        .recordings
        .finalize_for_input(session_id, FinalizeReason::InputDisconnected)
        .await
    {
        Ok(Some(done)) => state.announce_stopped(&done).await,
        Ok(None) => {}
        Err(err) => warn!(
            %session_id,
            error = %err,
            "Failed to finalize recording of disconnected keyboard"
        ),
    }
}

async fn handle_control_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let forward = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if send_json(&mut sender, &message).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let _ = tx.send(ServerMessage::SessionAssigned {
        session_id: session_id.clone(),
    });
    state.roster.add_monitor(&session_id, tx.clone()).await;
    info!(%session_id, "Control client connected");

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match MonitorCommand::parse(&text) {
                Ok(command) => handle_command(&state, &session_id, &tx, command).await,
                Err(err) => warn!(%session_id, error = %err, "Dropping malformed control message"),
            },
            Ok(WsMessage::Binary(bytes)) => {
                handle_audio_frame(&state, &session_id, &tx, bytes).await
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
            Err(err) => {
                debug!(%session_id, error = %err, "Control socket error");
                break;
            }
        }
    }

    state.roster.remove_monitor(&session_id).await;
    let finalized = state
        .recordings
        .finalize_for_control(&session_id, FinalizeReason::MonitorDisconnected)
        .await;
    info!(%session_id, finalized = finalized.len(), "Control client disconnected");

    drop(tx);
    forward.abort();
}

async fn handle_command(
    state: &AppState,
    session_id: &str,
    tx: &MonitorSender,
    command: MonitorCommand,
) {
    match command {
        MonitorCommand::StartRecording {
            keyboard_session_id,
            recording_id,
        } => start_recording(state, session_id, tx, &keyboard_session_id, &recording_id).await,
        MonitorCommand::StopRecording { recording_id } => {
            match state.recordings.stop(&recording_id).await {
                Ok(Some(done)) => {
                    let _ = tx.send(ServerMessage::RecordingStopped {
                        recording_id: done.recording_id.clone(),
                        end_timestamp: done.end_timestamp,
                        filename: done.filename.clone(),
                    });
                    if done.control_session_id != session_id {
                        state.announce_stopped(&done).await;
                    }
                }
                Ok(None) => {
                    debug!(%session_id, %recording_id, "Stop for inactive recording ignored")
                }
                Err(err) => {
                    warn!(%session_id, %recording_id, error = %err, "Failed to stop recording");
                    let _ = tx.send(ServerMessage::error(
                        err.to_string(),
                        Some(json!({ "recording_id": recording_id, "reason": err.reason() })),
                    ));
                }
            }
        }
    }
}

async fn start_recording(
    state: &AppState,
    session_id: &str,
    tx: &MonitorSender,
    keyboard_session_id: &str,
    recording_id: &str,
) {
    if !state.roster.contains_input(keyboard_session_id).await {
        info!(
            %session_id,
            keyboard_session_id,
            recording_id,
            "Start requested for unknown keyboard session"
        );
        let _ = tx.send(ServerMessage::error(
            "Keyboard session not found",
            Some(json!({
                "keyboard_session_id": keyboard_session_id,
                "recording_id": recording_id,
                "reason": "keyboard_session_not_found",
            })),
        ));
        return;
    }

    let started = match state
        .recordings
        .start(recording_id, keyboard_session_id, session_id)
        .await
    {
        Ok(started) => started,
        Err(err) => {
            info!(
                %session_id,
                keyboard_session_id,
                recording_id,
                error = %err,
                "Recording rejected"
            );
            let _ = tx.send(ServerMessage::error(
                err.to_string(),
                Some(json!({
                    "keyboard_session_id": keyboard_session_id,
                    "recording_id": recording_id,
                    "reason": err.reason(),
                })),
            ));
            return;
        }
    };

    let _ = tx.send(ServerMessage::RecordingStarted {
        recording_id: started.recording_id,
        keyboard_session_id: started.keyboard_session_id,
        start_timestamp: started.start_timestamp,
    });

    // The keyboard may have dropped between the roster check and the start;
    // its disconnect path would then have found nothing to finalize.
    if !state.roster.contains_input(keyboard_session_id).await {
        if let Ok(Some(done)) = state
            .recordings
            .finalize_for_input(keyboard_session_id, FinalizeReason::InputDisconnected)
            .await
        {
            state.announce_stopped(&done).await;
        }
    }
}

async fn handle_audio_frame(
    state: &AppState,
    session_id: &str,
    tx: &MonitorSender,
    bytes: Vec<u8>,
) {
    let frame = match AudioFrame::decode(bytes) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%session_id, error = %err, "Dropping malformed audio frame");
            return;
        }
    };

    let AudioFrame {
        recording_id,
        keyboard_session_id,
        payload,
    } = frame;
    let len = payload.len();
    match state
        .recordings
        .append_audio(&recording_id, &keyboard_session_id, payload)
        .await
    {
        Ok(()) => trace!(%session_id, %recording_id, len, "Audio chunk queued"),
        Err(err) => {
            if !matches!(err, RecorderError::RecordingNotFound(_)) {
                warn!(%session_id, %recording_id, error = %err, "Audio chunk rejected");
            }
            let _ = tx.send(ServerMessage::error(
                err.to_string(),
                Some(json!({ "recording_id": recording_id, "reason": err.reason() })),
            ));
        }
    }
}
