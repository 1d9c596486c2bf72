//! Room model — authoritative per-room game state and its pure mutations.
//!
//! DESIGN
//! ======
//! `Room` is the document the store persists under an optimistic version.
//! Every turn-state mutation here is a pure in-memory function so the
//! store's retry loop can reload and reapply it safely; timers, broadcasts,
//! and persistence live in the engine and gateway.
//!
//! `drawing`, `chat`, `last_activity`, and `version` are hydrated from their
//! own columns/tables by the store and skipped when serializing the core
//! document.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{GameStateView, PlayerView, RoomSettings, SettingsPatch};

pub const DEFAULT_MAX_PLAYERS: u8 = 8;
pub const DEFAULT_MAX_ROUNDS: u32 = 3;
pub const DEFAULT_DRAW_TIME: u32 = 60;
pub const DEFAULT_WORD_COUNT: u8 = 3;

pub const MIN_PLAYERS_TO_START: usize = 2;
pub const CHAT_RING_CAPACITY: usize = 50;

const MAX_CUSTOM_WORDS: usize = 500;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("need at least {MIN_PLAYERS_TO_START} players to start")]
    NotEnoughPlayers,
    #[error("game already started")]
    AlreadyStarted,
    #[error("room is full")]
    RoomFull,
    #[error("settings can only change in the lobby")]
    NotInLobby,
}

/// Engine phase for one room. `current_word` is `Some` exactly in `Drawing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lobby,
    Choosing,
    Drawing,
    Intermission,
}

/// One chat record in the bounded ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub session_id: String,
    pub name: String,
    pub msg: String,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Stable identity, survives transport churn. Primary key for scoring.
    pub session_id: String,
    /// Volatile transport identity, rewritten on every (re)connect.
    #[serde(default)]
    pub socket_id: Option<Uuid>,
    pub name: String,
    pub avatar: [u16; 4],
    pub score: i64,
    pub is_connected: bool,
    pub last_seen: i64,
}

impl Player {
    #[must_use]
    pub fn new(session_id: String, name: String, avatar: [u16; 4], socket_id: Uuid, now: i64) -> Self {
        Self {
            session_id,
            socket_id: Some(socket_id),
            name,
            avatar,
            score: 0,
            is_connected: true,
            last_seen: now,
        }
    }
}

/// Result of removing a player, used by the engine to decide whether the
/// current turn must end and whether rotation wrapped.
#[derive(Debug)]
pub struct RemovedPlayer {
    pub player: Player,
    /// The removed player was the active drawer of a CHOOSING/DRAWING turn.
    pub was_drawer: bool,
    /// Removal moved `drawer_index` past the end of the list back to 0.
    pub wrapped: bool,
}

/// Payload captured when a turn finishes, before rotation.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub word: String,
    pub drawer_bonus: i64,
    pub correct_guessers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAdvance {
    NextTurn,
    GameOver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: String,
    pub players: Vec<Player>,
    pub max_players: u8,
    pub game_started: bool,
    pub phase: Phase,
    pub round: u32,
    pub max_rounds: u32,
    pub drawer_index: usize,
    pub current_word: Option<String>,
    /// Absolute deadline of the drawing phase, epoch milliseconds.
    pub turn_ends_at: i64,
    pub revealed_letters: BTreeSet<usize>,
    pub correct_guessers: HashSet<String>,
    /// Points awarded this turn only, keyed by session id.
    pub round_points: HashMap<String, i64>,
    pub draw_time: u32,
    pub word_count: u8,
    pub custom_words: Vec<String>,
    pub custom_word_probability: u8,

    /// Opaque last-known stroke snapshot. Hot-path column, not in the doc.
    #[serde(skip, default = "empty_strokes")]
    pub drawing: serde_json::Value,
    /// Chat ring, newest last. Own table, not in the doc.
    #[serde(skip)]
    pub chat: Vec<ChatEntry>,
    /// Epoch milliseconds of the last observed activity. Column.
    #[serde(skip)]
    pub last_activity: i64,
    /// Optimistic-concurrency version of the loaded row.
    #[serde(skip)]
    pub version: i64,
}

fn empty_strokes() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

// =============================================================================
// CONSTRUCTION & LOOKUP
// =============================================================================

impl Room {
    #[must_use]
    pub fn new(room_id: String, now: i64) -> Self {
        Self {
            room_id,
            players: Vec::new(),
            max_players: DEFAULT_MAX_PLAYERS,
            game_started: false,
            phase: Phase::Lobby,
            round: 1,
            max_rounds: DEFAULT_MAX_ROUNDS,
            drawer_index: 0,
            current_word: None,
            turn_ends_at: 0,
            revealed_letters: BTreeSet::new(),
            correct_guessers: HashSet::new(),
            round_points: HashMap::new(),
            draw_time: DEFAULT_DRAW_TIME,
            word_count: DEFAULT_WORD_COUNT,
            custom_words: Vec::new(),
            custom_word_probability: 0,
            drawing: empty_strokes(),
            chat: Vec::new(),
            last_activity: now,
            version: 0,
        }
    }

    /// Drawer index clamped into `[0, |players|)`; 0 for empty rooms.
    #[must_use]
    pub fn clamped_drawer_index(&self) -> usize {
        if self.players.is_empty() {
            0
        } else {
            self.drawer_index.min(self.players.len() - 1)
        }
    }

    /// The player at the drawer slot, independent of phase.
    #[must_use]
    pub fn drawer(&self) -> Option<&Player> {
        self.players.get(self.clamped_drawer_index())
    }

    #[must_use]
    pub fn drawer_session_id(&self) -> Option<&str> {
        self.drawer().map(|p| p.session_id.as_str())
    }

    /// Host is the first connected player; an all-disconnected room falls
    /// back to list order so host-only checks stay well-defined.
    #[must_use]
    pub fn host(&self) -> Option<&Player> {
        self.players
            .iter()
            .find(|p| p.is_connected)
            .or_else(|| self.players.first())
    }

    #[must_use]
    pub fn is_host(&self, session_id: &str) -> bool {
        self.host().is_some_and(|p| p.session_id == session_id)
    }

    #[must_use]
    pub fn find_player(&self, session_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.session_id == session_id)
    }

    #[must_use]
    pub fn player(&self, session_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.session_id == session_id)
    }

    pub fn player_mut(&mut self, session_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.session_id == session_id)
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_connected).count()
    }

    /// Connected players other than the drawer: the set that can still score.
    #[must_use]
    pub fn eligible_guessers(&self) -> usize {
        let drawer = self.clamped_drawer_index();
        self.players
            .iter()
            .enumerate()
            .filter(|(i, p)| *i != drawer && p.is_connected)
            .count()
    }

    /// Remaining drawing seconds: `max(0, ceil((turn_ends_at - now) / 1000))`.
    #[must_use]
    pub fn time_left_secs(&self, now: i64) -> u64 {
        let remaining_ms = (self.turn_ends_at - now).max(0);
        ((remaining_ms + 999) / 1000) as u64
    }

    /// Current hint mask, present only during DRAWING.
    #[must_use]
    pub fn word_hint(&self) -> Option<String> {
        self.current_word
            .as_ref()
            .map(|w| crate::words::mask_word(w, &self.revealed_letters))
    }
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

impl Room {
    /// Add a new player.
    ///
    /// # Errors
    ///
    /// Returns `RoomFull` when the roster is at `max_players`.
    pub fn add_player(&mut self, player: Player) -> Result<(), RuleError> {
        if self.players.len() >= usize::from(self.max_players) {
            return Err(RuleError::RoomFull);
        }
        self.players.push(player);
        Ok(())
    }

    /// Re-bind a session to a new socket. Returns false for unknown sessions.
    pub fn bind_socket(&mut self, session_id: &str, socket_id: Uuid, now: i64) -> bool {
        let Some(player) = self.player_mut(session_id) else {
            return false;
        };
        player.socket_id = Some(socket_id);
        player.is_connected = true;
        player.last_seen = now;
        true
    }

    /// Mark a session disconnected. Returns false for unknown sessions.
    pub fn mark_disconnected(&mut self, session_id: &str, now: i64) -> bool {
        let Some(player) = self.player_mut(session_id) else {
            return false;
        };
        player.socket_id = None;
        player.is_connected = false;
        player.last_seen = now;
        true
    }

    /// Remove a player, fixing up `drawer_index` so invariant 1 holds.
    pub fn remove_player(&mut self, session_id: &str) -> Option<RemovedPlayer> {
        let idx = self.find_player(session_id)?;
        let was_drawer = self.game_started
            && matches!(self.phase, Phase::Choosing | Phase::Drawing)
            && idx == self.clamped_drawer_index();

        let player = self.players.remove(idx);
        self.correct_guessers.remove(session_id);
        self.round_points.remove(session_id);

        let mut wrapped = false;
        if self.players.is_empty() {
            self.drawer_index = 0;
        } else if idx < self.drawer_index {
            self.drawer_index -= 1;
        } else if self.drawer_index >= self.players.len() {
            // The removed slot was the tail; rotation wraps to the head.
            self.drawer_index = 0;
            wrapped = true;
        }

        Some(RemovedPlayer { player, was_drawer, wrapped })
    }
}

// =============================================================================
// TURN PROGRESSION
// =============================================================================

impl Room {
    /// Host starts the game: resets scores, round 1, drawer 0.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` or `NotEnoughPlayers`.
    pub fn start_game(&mut self) -> Result<(), RuleError> {
        if self.game_started {
            return Err(RuleError::AlreadyStarted);
        }
        if self.players.len() < MIN_PLAYERS_TO_START {
            return Err(RuleError::NotEnoughPlayers);
        }
        for p in &mut self.players {
            p.score = 0;
        }
        self.game_started = true;
        self.round = 1;
        self.drawer_index = 0;
        self.current_word = None;
        self.revealed_letters.clear();
        self.correct_guessers.clear();
        self.round_points.clear();
        Ok(())
    }

    /// Enter CHOOSING for the current drawer slot.
    pub fn begin_choosing(&mut self) {
        self.drawer_index = self.clamped_drawer_index();
        self.phase = Phase::Choosing;
        self.current_word = None;
        self.revealed_letters.clear();
        self.correct_guessers.clear();
        self.round_points.clear();
    }

    /// Enter DRAWING with the selected word and a fresh deadline.
    pub fn begin_drawing(&mut self, word: String, now: i64) {
        self.phase = Phase::Drawing;
        self.current_word = Some(word);
        self.turn_ends_at = now + i64::from(self.draw_time) * 1000;
        self.revealed_letters.clear();
        self.correct_guessers.clear();
    }

    /// Uncover one letter index. Rejects out-of-range and duplicate indices,
    /// keeping `revealed_letters` a growing subset of the word's positions.
    pub fn reveal(&mut self, index: usize) -> bool {
        let Some(word) = &self.current_word else {
            return false;
        };
        if index >= word.chars().count() {
            return false;
        }
        self.revealed_letters.insert(index)
    }

    /// Letter positions not yet revealed.
    #[must_use]
    pub fn hidden_indices(&self) -> Vec<usize> {
        let Some(word) = &self.current_word else {
            return Vec::new();
        };
        (0..word.chars().count())
            .filter(|i| !self.revealed_letters.contains(i))
            .collect()
    }

    /// Credit a correct guess once per `(session, turn)`. The drawer and
    /// unknown sessions never score; duplicates return false.
    pub fn credit_guess(&mut self, session_id: &str, points: i64) -> bool {
        if self.phase != Phase::Drawing {
            return false;
        }
        if self.drawer_session_id() == Some(session_id) {
            return false;
        }
        if self.find_player(session_id).is_none() {
            return false;
        }
        if !self.correct_guessers.insert(session_id.to_string()) {
            return false;
        }
        if let Some(player) = self.player_mut(session_id) {
            player.score += points;
        }
        *self.round_points.entry(session_id.to_string()).or_insert(0) += points;
        true
    }

    /// Close out the drawing phase: pay the drawer bonus, clear the word,
    /// and move to INTERMISSION. Returns the turn results for broadcast.
    pub fn finish_turn(&mut self, bonus_per_guesser: i64) -> TurnSummary {
        let word = self.current_word.take().unwrap_or_default();
        let bonus = bonus_per_guesser * self.correct_guessers.len() as i64;

        if bonus > 0 {
            let drawer_idx = self.clamped_drawer_index();
            if let Some(drawer) = self.players.get_mut(drawer_idx) {
                drawer.score += bonus;
                let sid = drawer.session_id.clone();
                *self.round_points.entry(sid).or_insert(0) += bonus;
            }
        }

        let mut correct: Vec<String> = self.correct_guessers.iter().cloned().collect();
        correct.sort();

        self.phase = Phase::Intermission;
        self.revealed_letters.clear();

        TurnSummary { word, drawer_bonus: bonus, correct_guessers: correct }
    }

    /// Rotate the drawer slot; a wrap to 0 advances the round. Returns
    /// `GameOver` when the post-increment round exceeds `max_rounds`.
    pub fn advance_turn(&mut self) -> TurnAdvance {
        if self.players.is_empty() {
            return TurnAdvance::GameOver;
        }
        self.drawer_index = (self.clamped_drawer_index() + 1) % self.players.len();
        if self.drawer_index == 0 {
            self.round += 1;
        }
        if self.round > self.max_rounds {
            TurnAdvance::GameOver
        } else {
            TurnAdvance::NextTurn
        }
    }

    /// Return to LOBBY after a game. Scores persist for the results screen
    /// and reset on the next `start_game`.
    pub fn end_game(&mut self) {
        self.game_started = false;
        self.phase = Phase::Lobby;
        self.current_word = None;
        self.turn_ends_at = 0;
        self.drawer_index = 0;
        self.revealed_letters.clear();
        self.correct_guessers.clear();
        self.round_points.clear();
    }
}

// =============================================================================
// SETTINGS & VIEWS
// =============================================================================

impl Room {
    /// Apply a host settings patch, clamping every value into its range.
    ///
    /// # Errors
    ///
    /// Returns `NotInLobby` once the game has started.
    pub fn apply_settings(&mut self, patch: &SettingsPatch) -> Result<(), RuleError> {
        if self.game_started {
            return Err(RuleError::NotInLobby);
        }
        if let Some(v) = patch.max_players {
            self.max_players = v.clamp(2, 15);
        }
        if let Some(v) = patch.max_rounds {
            self.max_rounds = v.clamp(1, 10);
        }
        if let Some(v) = patch.draw_time {
            self.draw_time = v.clamp(30, 180);
        }
        if let Some(v) = patch.word_count {
            self.word_count = v.clamp(3, 5);
        }
        if let Some(v) = patch.custom_word_probability {
            self.custom_word_probability = v.min(100);
        }
        if let Some(words) = &patch.custom_words {
            self.custom_words = words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .take(MAX_CUSTOM_WORDS)
                .collect();
        }
        Ok(())
    }

    #[must_use]
    pub fn settings(&self) -> RoomSettings {
        RoomSettings {
            max_players: self.max_players,
            max_rounds: self.max_rounds,
            draw_time: self.draw_time,
            word_count: self.word_count,
            custom_words: self.custom_words.clone(),
            custom_word_probability: self.custom_word_probability,
        }
    }

    /// Roster view with derived `is_drawer` / `is_host` flags.
    #[must_use]
    pub fn player_views(&self) -> Vec<PlayerView> {
        let host_sid = self.host().map(|p| p.session_id.clone());
        let drawer_active = matches!(self.phase, Phase::Choosing | Phase::Drawing);
        let drawer_idx = self.clamped_drawer_index();

        self.players
            .iter()
            .enumerate()
            .map(|(i, p)| PlayerView {
                session_id: p.session_id.clone(),
                name: p.name.clone(),
                avatar: p.avatar,
                score: p.score,
                is_drawer: drawer_active && i == drawer_idx,
                is_host: host_sid.as_deref() == Some(p.session_id.as_str()),
                is_connected: p.is_connected,
            })
            .collect()
    }

    /// Full snapshot for reconnects and late joiners.
    #[must_use]
    pub fn game_state(&self, now: i64) -> GameStateView {
        let drawing_phase = self.phase == Phase::Drawing;
        GameStateView {
            room_id: self.room_id.clone(),
            players: self.player_views(),
            game_started: self.game_started,
            round: self.round,
            time_left: if drawing_phase { self.time_left_secs(now) } else { 0 },
            word_hint: if drawing_phase { self.word_hint() } else { None },
            drawing: self.drawing.clone(),
            chat: self.chat.clone(),
            settings: self.settings(),
        }
    }

    /// Append to the in-memory chat mirror, trimming to the ring capacity.
    pub fn push_chat(&mut self, entry: ChatEntry) {
        self.chat.push(entry);
        if self.chat.len() > CHAT_RING_CAPACITY {
            let excess = self.chat.len() - CHAT_RING_CAPACITY;
            self.chat.drain(..excess);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
