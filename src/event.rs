//! Event — the wire vocabulary for sketchguess.
//!
//! ARCHITECTURE
//! ============
//! Every websocket message is one of two closed sets: inbound [`ClientEvent`]
//! or outbound [`ServerEvent`]. The gateway parses inbound text into
//! `ClientEvent`, dispatches by variant, and fans `ServerEvent`s back out.
//!
//! DESIGN
//! ======
//! - Adjacently tagged JSON: `{ "event": "joinRoom", "data": { ... } }`.
//! - camelCase field names on the wire.
//! - Unknown fields are ignored; unknown event names fail to parse and the
//!   sender receives a single `error` event.
//! - Stroke payloads (`lines`, `drawing`) are opaque JSON the server relays
//!   and snapshots but never interprets.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::room::ChatEntry;

/// Current time as milliseconds since Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// INBOUND
// =============================================================================

/// Partial settings update sent by the host pre-game. Absent fields are left
/// unchanged; present fields are clamped to their allowed ranges on apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub max_players: Option<u8>,
    pub max_rounds: Option<u32>,
    pub draw_time: Option<u32>,
    pub word_count: Option<u8>,
    pub custom_words: Option<Vec<String>>,
    pub custom_word_probability: Option<u8>,
}

/// Inbound client → server events.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    CreateRoom {
        player_name: String,
        avatar: [u16; 4],
        #[serde(default)]
        session_id: Option<String>,
    },
    JoinRoom {
        room_id: String,
        player_name: String,
        avatar: [u16; 4],
        #[serde(default)]
        session_id: Option<String>,
    },
    ReconnectToRoom {
        session_id: String,
        room_id: String,
    },
    UpdateSettings {
        room_id: String,
        settings: SettingsPatch,
    },
    StartGame {
        room_id: String,
    },
    WordSelected {
        room_id: String,
        word: String,
    },
    Draw {
        room_id: String,
        lines: serde_json::Value,
    },
    ClearCanvas {
        room_id: String,
    },
    Chat {
        room_id: String,
        msg: String,
        #[serde(default)]
        name: Option<String>,
    },
    Guess {
        room_id: String,
        guess: String,
        #[serde(default)]
        name: Option<String>,
    },
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Public view of one player. `is_drawer` and `is_host` are derived from room
/// state at serialization time; `socket_id` never leaves the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub session_id: String,
    pub name: String,
    pub avatar: [u16; 4],
    pub score: i64,
    pub is_drawer: bool,
    pub is_host: bool,
    pub is_connected: bool,
}

/// Room settings as broadcast to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub max_players: u8,
    pub max_rounds: u32,
    pub draw_time: u32,
    pub word_count: u8,
    pub custom_words: Vec<String>,
    pub custom_word_probability: u8,
}

/// Full room snapshot for reconnects and late joiners: roster, turn timing,
/// the masked word, the last stroke snapshot, and the chat ring.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub room_id: String,
    pub players: Vec<PlayerView>,
    pub game_started: bool,
    pub round: u32,
    pub time_left: u64,
    pub word_hint: Option<String>,
    pub drawing: serde_json::Value,
    pub chat: Vec<ChatEntry>,
    pub settings: RoomSettings,
}

/// Outbound server → client events.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    RoomCreated {
        room_id: String,
        session_id: String,
        players: Vec<PlayerView>,
    },
    RoomJoined {
        room_id: String,
        session_id: String,
        game_state: GameStateView,
    },
    ReconnectionSuccess {
        game_state: GameStateView,
    },
    PlayerJoined {
        players: Vec<PlayerView>,
    },
    PlayerDisconnected {
        session_id: String,
        players: Vec<PlayerView>,
    },
    PlayerReconnected {
        session_id: String,
        players: Vec<PlayerView>,
    },
    SettingsUpdated {
        settings: RoomSettings,
    },
    DrawerSelecting {
        drawer_name: String,
        players: Vec<PlayerView>,
    },
    SelectWord {
        words: Vec<String>,
    },
    YourWord {
        word: String,
    },
    GameStarted {
        players: Vec<PlayerView>,
        round: u32,
    },
    Tick {
        time_left: u64,
    },
    HintUpdate {
        hint: String,
    },
    Draw {
        lines: serde_json::Value,
    },
    ClearCanvas,
    Chat {
        session_id: String,
        name: String,
        msg: String,
        ts: i64,
    },
    CloseGuess {
        message: String,
    },
    CorrectGuess {
        session_id: String,
        name: String,
        points: i64,
        players: Vec<PlayerView>,
    },
    TurnEnded {
        word: String,
        players: Vec<PlayerView>,
        correct_guessers: Vec<String>,
        drawer_bonus: i64,
    },
    GameOver {
        players: Vec<PlayerView>,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Standard reply for an unknown or unparseable inbound event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
