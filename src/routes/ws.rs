//! WebSocket gateway — bidirectional event relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a socket id and enters a `select!` loop:
//! - Incoming client text → parse into a `ClientEvent` + dispatch by variant
//! - Broadcast events from room peers → forward to the client
//!
//! For every inbound event the gateway resolves the caller's session,
//! applies rate limits and validation, and hands the work to the engine or
//! store. Errors of any kind answer the offender with a single `error`
//! event and are never broadcast.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → socket id assigned; session binds on create/join/reconnect
//! 2. Client sends events → dispatch → replies flow back to the sender
//! 3. Close → session marked disconnected, reconnect grace armed

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{now_ms, ClientEvent, ServerEvent, SettingsPatch};
use crate::room::{Player, Room};
use crate::services::engine::{self, GameError};
use crate::services::session;
use crate::services::store::{self, StoreError};
use crate::state::{AppState, Gateway};
use crate::validation;

/// Attempts at generating an unclaimed room id before giving up.
const ROOM_ID_ATTEMPTS: usize = 5;

// =============================================================================
// CONNECTION CONTEXT
// =============================================================================

/// Per-connection state: the volatile socket id, the session/room the
/// socket has bound to, and the fan-in channel peers broadcast into.
pub(crate) struct ConnCtx {
    pub(crate) socket_id: Uuid,
    pub(crate) session_id: Option<String>,
    pub(crate) room_id: Option<String>,
    pub(crate) tx: mpsc::Sender<ServerEvent>,
}

// =============================================================================
// UPGRADE & CONNECTION
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let socket_id = Uuid::new_v4();
    let (tx, mut rx) = Gateway::channel();
    let mut ctx = ConnCtx { socket_id, session_id: None, room_id: None, tx };

    info!(%socket_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut ctx, &text).await;
                        for event in replies {
                            let _ = send_event(&mut socket, &event).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    if let (Some(room_id), Some(session_id)) = (ctx.room_id.clone(), ctx.session_id.clone()) {
        state.gateway.unregister(&room_id, socket_id).await;
        if let Err(e) = engine::handle_disconnect(&state, &room_id, &session_id, socket_id).await {
            warn!(error = %e, %room_id, "disconnect handling failed");
        }
    }
    state.limiter.remove_socket(socket_id);
    info!(%socket_id, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse and process one inbound text frame, returning events for the
/// sender. Kept transport-free so tests can exercise dispatch end-to-end.
pub(crate) async fn process_inbound_text(
    state: &AppState,
    ctx: &mut ConnCtx,
    text: &str,
) -> Vec<ServerEvent> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(socket_id = %ctx.socket_id, error = %e, "ws: invalid inbound event");
            return vec![ServerEvent::error(format!("invalid event: {e}"))];
        }
    };

    match dispatch(state, ctx, event).await {
        Ok(replies) => replies,
        Err(err) => {
            if let GameError::Store(store_err) = &err {
                warn!(socket_id = %ctx.socket_id, error = %store_err, "ws: store error");
            }
            vec![ServerEvent::error(user_message(&err))]
        }
    }
}

async fn dispatch(
    state: &AppState,
    ctx: &mut ConnCtx,
    event: ClientEvent,
) -> Result<Vec<ServerEvent>, GameError> {
    match event {
        ClientEvent::CreateRoom { player_name, avatar, session_id } => {
            handle_create(state, ctx, &player_name, avatar, session_id).await
        }
        ClientEvent::JoinRoom { room_id, player_name, avatar, session_id } => {
            handle_join(state, ctx, &room_id, &player_name, avatar, session_id).await
        }
        ClientEvent::ReconnectToRoom { session_id, room_id } => {
            handle_reconnect(state, ctx, &session_id, &room_id).await
        }
        ClientEvent::UpdateSettings { room_id, settings } => {
            handle_settings(state, ctx, &room_id, settings).await
        }
        ClientEvent::StartGame { room_id } => {
            let (room_id, session_id) = member_ctx(ctx, &room_id)?;
            engine::start_game(state, &room_id, &session_id).await?;
            Ok(Vec::new())
        }
        ClientEvent::WordSelected { room_id, word } => {
            let (room_id, session_id) = member_ctx(ctx, &room_id)?;
            engine::word_selected(state, &room_id, &session_id, &word).await?;
            Ok(Vec::new())
        }
        ClientEvent::Draw { room_id, lines } => handle_draw(state, ctx, &room_id, lines).await,
        ClientEvent::ClearCanvas { room_id } => handle_clear(state, ctx, &room_id).await,
        ClientEvent::Chat { room_id, msg, name } => {
            handle_chat(state, ctx, &room_id, &msg, name.as_deref()).await
        }
        ClientEvent::Guess { room_id, guess, .. } => {
            let (room_id, session_id) = member_ctx(ctx, &room_id)?;
            state.limiter.check_chat(ctx.socket_id)?;
            let cleaned = validation::clean_guess(&guess)?;
            engine::handle_guess(state, &room_id, &session_id, cleaned).await?;
            Ok(Vec::new())
        }
    }
}

/// Resolve the caller's `(room, session)` binding and require it to match
/// the room named in the event.
fn member_ctx(ctx: &ConnCtx, claimed_room: &str) -> Result<(String, String), GameError> {
    let (Some(room_id), Some(session_id)) = (&ctx.room_id, &ctx.session_id) else {
        return Err(GameError::NotMember);
    };
    let claimed = session::normalize_room_id(claimed_room).ok_or(GameError::NotMember)?;
    if &claimed != room_id {
        return Err(GameError::NotMember);
    }
    Ok((room_id.clone(), session_id.clone()))
}

// =============================================================================
// ROOM MEMBERSHIP HANDLERS
// =============================================================================

async fn handle_create(
    state: &AppState,
    ctx: &mut ConnCtx,
    player_name: &str,
    avatar: [u16; 4],
    session_id: Option<String>,
) -> Result<Vec<ServerEvent>, GameError> {
    let name = validation::clean_name(player_name)?;
    let session_id = session_id.unwrap_or_else(session::generate_session_id);
    leave_current(state, ctx).await;

    let now = now_ms();
    let mut last_err: Option<StoreError> = None;
    for _ in 0..ROOM_ID_ATTEMPTS {
        let room_id = session::generate_room_id();
        let mut room = Room::new(room_id.clone(), now);
        room.add_player(Player::new(session_id.clone(), name.clone(), avatar, ctx.socket_id, now))?;

        match store::create(&state.pool, &room).await {
            Ok(()) => {
                state.gateway.register(&room_id, ctx.socket_id, &session_id, ctx.tx.clone()).await;
                ctx.room_id = Some(room_id.clone());
                ctx.session_id = Some(session_id.clone());
                info!(%room_id, %session_id, "room created");
                return Ok(vec![ServerEvent::RoomCreated {
                    room_id,
                    session_id,
                    players: room.player_views(),
                }]);
            }
            Err(err @ StoreError::Duplicate(_)) => last_err = Some(err),
            Err(e) => return Err(e.into()),
        }
    }
    Err(last_err.unwrap_or_else(|| StoreError::Duplicate(String::new())).into())
}

async fn handle_join(
    state: &AppState,
    ctx: &mut ConnCtx,
    room_id: &str,
    player_name: &str,
    avatar: [u16; 4],
    session_id: Option<String>,
) -> Result<Vec<ServerEvent>, GameError> {
    let name = validation::clean_name(player_name)?;
    let room_id = session::normalize_room_id(room_id)
        .ok_or_else(|| StoreError::NotFound(room_id.to_string()))?;
    let session_id = session_id.unwrap_or_else(session::generate_session_id);
    leave_current(state, ctx).await;

    let now = now_ms();
    let socket_id = ctx.socket_id;
    let sid = session_id.clone();
    let (room, _rejoined) = store::update_room(&state.pool, &room_id, move |room: &mut Room| {
        if room.find_player(&sid).is_some() {
            // Same session joining again: a rebind, never a duplicate seat.
            room.bind_socket(&sid, socket_id, now);
            Ok::<_, GameError>(true)
        } else {
            room.add_player(Player::new(sid.clone(), name.clone(), avatar, socket_id, now))?;
            Ok(false)
        }
    })
    .await?;

    state.engine.clear_removal_task(&room_id, &session_id);
    state.gateway.register(&room_id, ctx.socket_id, &session_id, ctx.tx.clone()).await;
    ctx.room_id = Some(room_id.clone());
    ctx.session_id = Some(session_id.clone());

    info!(%room_id, %session_id, players = room.players.len(), "player joined room");
    state
        .gateway
        .broadcast(
            &room_id,
            &ServerEvent::PlayerJoined { players: room.player_views() },
            Some(ctx.socket_id),
        )
        .await;

    Ok(vec![ServerEvent::RoomJoined {
        room_id,
        session_id,
        game_state: room.game_state(now),
    }])
}

async fn handle_reconnect(
    state: &AppState,
    ctx: &mut ConnCtx,
    session_id: &str,
    room_id: &str,
) -> Result<Vec<ServerEvent>, GameError> {
    let room_id = session::normalize_room_id(room_id)
        .ok_or_else(|| StoreError::NotFound(room_id.to_string()))?;
    leave_current(state, ctx).await;

    let now = now_ms();
    let socket_id = ctx.socket_id;
    let sid = session_id.to_string();
    let (room, known) = store::update_room(&state.pool, &room_id, move |room: &mut Room| {
        Ok::<_, GameError>(room.bind_socket(&sid, socket_id, now))
    })
    .await?;

    if !known {
        return Err(GameError::UnknownSession);
    }

    state.engine.clear_removal_task(&room_id, session_id);
    state.gateway.register(&room_id, ctx.socket_id, session_id, ctx.tx.clone()).await;
    ctx.room_id = Some(room_id.clone());
    ctx.session_id = Some(session_id.to_string());

    info!(%room_id, %session_id, "player reconnected");
    state
        .gateway
        .broadcast(
            &room_id,
            &ServerEvent::PlayerReconnected {
                session_id: session_id.to_string(),
                players: room.player_views(),
            },
            Some(ctx.socket_id),
        )
        .await;

    Ok(vec![ServerEvent::ReconnectionSuccess { game_state: room.game_state(now) }])
}

/// Detach this socket from its current room, if any, before it binds to a
/// new one. The old session follows the normal disconnect path.
async fn leave_current(state: &AppState, ctx: &mut ConnCtx) {
    let (Some(room_id), Some(session_id)) = (ctx.room_id.take(), ctx.session_id.take()) else {
        return;
    };
    state.gateway.unregister(&room_id, ctx.socket_id).await;
    if let Err(e) = engine::handle_disconnect(state, &room_id, &session_id, ctx.socket_id).await {
        warn!(error = %e, %room_id, "leave handling failed");
    }
}

// =============================================================================
// GAME TRAFFIC HANDLERS
// =============================================================================

async fn handle_settings(
    state: &AppState,
    ctx: &mut ConnCtx,
    room_id: &str,
    patch: SettingsPatch,
) -> Result<Vec<ServerEvent>, GameError> {
    let (room_id, session_id) = member_ctx(ctx, room_id)?;

    let (room, ()) = store::update_room(&state.pool, &room_id, move |room: &mut Room| {
        if !room.is_host(&session_id) {
            return Err(GameError::NotHost);
        }
        room.apply_settings(&patch)?;
        Ok(())
    })
    .await?;

    state
        .gateway
        .broadcast(&room_id, &ServerEvent::SettingsUpdated { settings: room.settings() }, None)
        .await;
    Ok(Vec::new())
}

async fn handle_draw(
    state: &AppState,
    ctx: &mut ConnCtx,
    room_id: &str,
    lines: serde_json::Value,
) -> Result<Vec<ServerEvent>, GameError> {
    let (room_id, _session_id) = member_ctx(ctx, room_id)?;
    state.limiter.check_draw(ctx.socket_id)?;

    state
        .gateway
        .broadcast(&room_id, &ServerEvent::Draw { lines: lines.clone() }, Some(ctx.socket_id))
        .await;
    store::append_drawing_detached(&state.pool, &room_id, lines);
    Ok(Vec::new())
}

async fn handle_clear(
    state: &AppState,
    ctx: &mut ConnCtx,
    room_id: &str,
) -> Result<Vec<ServerEvent>, GameError> {
    let (room_id, _session_id) = member_ctx(ctx, room_id)?;

    state.gateway.broadcast(&room_id, &ServerEvent::ClearCanvas, Some(ctx.socket_id)).await;
    store::clear_drawing_detached(&state.pool, &room_id);
    Ok(Vec::new())
}

async fn handle_chat(
    state: &AppState,
    ctx: &mut ConnCtx,
    room_id: &str,
    msg: &str,
    name: Option<&str>,
) -> Result<Vec<ServerEvent>, GameError> {
    let (room_id, session_id) = member_ctx(ctx, room_id)?;
    state.limiter.check_chat(ctx.socket_id)?;
    let msg = validation::clean_message(msg)?;
    let name = name
        .and_then(|raw| validation::clean_name(raw).ok())
        .unwrap_or_else(|| "anonymous".to_string());

    let entry = crate::room::ChatEntry { session_id, name, msg, ts: now_ms() };
    state
        .gateway
        .broadcast(
            &room_id,
            &ServerEvent::Chat {
                session_id: entry.session_id.clone(),
                name: entry.name.clone(),
                msg: entry.msg.clone(),
                ts: entry.ts,
            },
            None,
        )
        .await;
    store::append_chat_detached(&state.pool, &room_id, entry);
    Ok(Vec::new())
}

// =============================================================================
// HELPERS
// =============================================================================

/// User-facing message for an error reply. Store internals never leak.
fn user_message(err: &GameError) -> String {
    match err {
        GameError::Store(StoreError::NotFound(_)) => "Room not found".to_string(),
        GameError::Store(StoreError::ConflictRetryExhausted(_)) => {
            "The room is busy, please try again".to_string()
        }
        GameError::Store(_) => "Server error".to_string(),
        other => other.to_string(),
    }
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize event");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
