//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{PlayerId, PlayerInput, SessionError, SessionHandle};
use crate::http::routes::AppError;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ErrorData, Outbound, ServerMsg, WelcomeData};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub match_id: Uuid,
    /// Stable id across reconnects; a fresh one is issued when absent
    pub player_id: Option<String>,
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let handle = state
        .registry
        .get(&query.match_id)
        .ok_or_else(|| AppError::NotFound(format!("Match {}", query.match_id)))?;

    let player_id = query
        .player_id
        .filter(|id| !id.trim().is_empty())
        .map(PlayerId::new)
        .unwrap_or_else(|| PlayerId::new(Uuid::new_v4().to_string()));
    let name = query.name.unwrap_or_default();

    info!(match_id = %handle.id, player_id = %player_id, "WebSocket upgrade");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, handle, player_id, name)))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, handle: SessionHandle, player_id: PlayerId, name: String) {
    info!(match_id = %handle.id, player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before joining so nothing published after the snapshot is missed
    let events_rx = handle.subscribe();

    let snapshot = match handle.join(player_id.clone(), name).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(match_id = %handle.id, player_id = %player_id, error = %e, "Join refused");
            let msg = match &e {
                SessionError::Denied(denied) => ServerMsg::ActionDenied(denied.into()),
                _ => ServerMsg::Error(ErrorData {
                    code: "match_unavailable".to_string(),
                    message: e.to_string(),
                }),
            };
            let _ = send_msg(&mut ws_sink, &msg).await;
            let _ = ws_sink.send(Message::Close(None)).await;
            return;
        }
    };

    let welcome = ServerMsg::Welcome(WelcomeData {
        player_id: player_id.clone(),
        server_time: unix_millis(),
    });
    for msg in [welcome, ServerMsg::SyncState(snapshot)] {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            error!(player_id = %player_id, error = %e, "Failed to send initial state");
            let _ = handle.leave(player_id.clone()).await;
            return;
        }
    }

    run_session(&handle, &player_id, ws_sink, ws_stream, events_rx).await;

    // Votes and cooldown survive the disconnect
    let _ = handle.leave(player_id.clone()).await;

    info!(match_id = %handle.id, player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    handle: &SessionHandle,
    player_id: &PlayerId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut events_rx: broadcast::Receiver<Outbound>,
) {
    let rate_limiter = PlayerRateLimiter::new();

    // Replies meant for this socket only (pong, denials)
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMsg>(32);

    // Spawn writer task: match events + direct replies -> WebSocket
    let writer_player_id = player_id.clone();
    let writer_session = handle.clone();
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                event = events_rx.recv() => {
                    match forward_event(event, &writer_session, &writer_player_id).await {
                        Forward::Send(msg) => msg,
                        Forward::Skip => continue,
                        Forward::Stop => break,
                    }
                }
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %writer_player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> match authority
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_frame() {
                    warn!(player_id = %player_id, "Rate limited client frame");
                    continue;
                }

                let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                if let ClientMsg::Ping { t } = client_msg {
                    let _ = direct_tx.send(ServerMsg::Pong { t }).await;
                    continue;
                }

                let Some((kind, data)) = client_msg.action() else {
                    continue;
                };
                if &data.voter_id != player_id {
                    warn!(
                        player_id = %player_id,
                        voter_id = %data.voter_id,
                        "Ignoring action sent on behalf of another player"
                    );
                    continue;
                }

                let input = PlayerInput {
                    player_id: player_id.clone(),
                    kind,
                    target_id: data.fish_id.clone(),
                    client_timestamp: data.client_timestamp,
                    received_at: unix_millis(),
                };

                match handle.submit(input).await {
                    Ok(_) => {}
                    Err(SessionError::Denied(denied)) => {
                        let _ = direct_tx
                            .send(ServerMsg::ActionDenied((&denied).into()))
                            .await;
                    }
                    Err(SessionError::Closed) => {
                        debug!(player_id = %player_id, "Match authority closed");
                        break;
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Action failed");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// What the writer does with one broadcast receive
#[derive(Debug)]
enum Forward {
    Send(ServerMsg),
    Skip,
    Stop,
}

/// Filter an event by audience. A lagged receiver has lost events, so the
/// client gets a fresh `sync:state` in their place.
async fn forward_event(
    event: Result<Outbound, broadcast::error::RecvError>,
    handle: &SessionHandle,
    player_id: &PlayerId,
) -> Forward {
    match event {
        Ok(event) if event.is_for(player_id) => Forward::Send(event.msg),
        Ok(_) => Forward::Skip,
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!(
                player_id = %player_id,
                lagged_count = n,
                "Client lagged, resyncing after {} dropped events", n
            );
            match handle.snapshot().await {
                Ok(snapshot) => Forward::Send(ServerMsg::SyncState(snapshot)),
                Err(e) => {
                    debug!(player_id = %player_id, error = %e, "Resync failed");
                    Forward::Stop
                }
            }
        }
        Err(broadcast::error::RecvError::Closed) => {
            debug!(player_id = %player_id, "Event channel closed");
            Forward::Stop
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
