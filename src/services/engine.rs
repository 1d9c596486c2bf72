//! Turn engine — the per-room state machine.
//!
//! ARCHITECTURE
//! ============
//! LOBBY → CHOOSING → DRAWING → INTERMISSION → CHOOSING … with GAMEOVER
//! folding back to LOBBY. The store holds the authoritative room document;
//! this module owns everything volatile around it: the 1-second tick
//! interval per drawing room, the 8-second word-selection timeout, the
//! 5-second intermission timer, candidate words offered to the drawer,
//! reconnect-grace removal tasks, and the end-turn-in-progress flag.
//!
//! CONCURRENCY
//! ===========
//! Transitions for one room are serialized by a per-room async mutex; the
//! `ending` flag drops re-entrant end attempts (tick deadline racing an
//! all-guessed early end) and is cleared only once the intermission timer is
//! scheduled. Tick iterations that fail log and continue — a tick never
//! kills the engine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use rand::seq::IndexedRandom;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{now_ms, ServerEvent};
use crate::room::{ChatEntry, Phase, Room, RuleError, TurnAdvance, MIN_PLAYERS_TO_START};
use crate::services::store::{self, StoreError};
use crate::state::AppState;
use crate::words;

pub const MAX_POINTS: i64 = 500;
pub const MIN_POINTS: i64 = 50;
pub const TURN_SECONDS: i64 = 60;
pub const DRAWER_BONUS_PER_GUESSER: i64 = 50;

pub const CHOOSE_SECONDS: u64 = 8;
pub const INTERMISSION_SECONDS: u64 = 5;

/// How long a disconnected session may linger before removal from the roster.
pub const RECONNECT_GRACE: Duration = Duration::from_secs(60);

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("You are not in this room")]
    NotMember,
    #[error("Only the host can do that")]
    NotHost,
    #[error("Only the drawer can do that")]
    NotDrawer,
    #[error("No word selection in progress")]
    NotChoosing,
    #[error("That word was not offered")]
    WordNotOffered,
    #[error("Reconnection failed: unknown session")]
    UnknownSession,
    #[error("{0}")]
    Rule(#[from] RuleError),
    #[error("{0}")]
    Validation(#[from] crate::validation::ValidationError),
    #[error("{0}")]
    RateLimited(#[from] crate::rate_limit::RateLimitError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Volatile per-room runtime owned by the engine: timers, flags, candidate
/// words, and the per-room transition locks. Everything here dies with the
/// process; the store is the durable source of truth.
pub struct EngineRuntime {
    tick_tasks: StdMutex<HashMap<String, JoinHandle<()>>>,
    phase_timers: StdMutex<HashMap<String, JoinHandle<()>>>,
    removal_tasks: StdMutex<HashMap<(String, String), JoinHandle<()>>>,
    ending: StdMutex<HashSet<String>>,
    candidates: StdMutex<HashMap<String, Vec<String>>>,
    locks: StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl EngineRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tick_tasks: StdMutex::new(HashMap::new()),
            phase_timers: StdMutex::new(HashMap::new()),
            removal_tasks: StdMutex::new(HashMap::new()),
            ending: StdMutex::new(HashSet::new()),
            candidates: StdMutex::new(HashMap::new()),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// The per-room transition lock. Created on first use.
    pub fn room_lock(&self, room_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn set_tick_task(&self, room_id: &str, handle: JoinHandle<()>) {
        if let Some(old) = self.tick_tasks.lock().unwrap().insert(room_id.to_string(), handle) {
            old.abort();
        }
    }

    fn abort_tick(&self, room_id: &str) {
        if let Some(handle) = self.tick_tasks.lock().unwrap().remove(room_id) {
            handle.abort();
        }
    }

    fn set_phase_timer(&self, room_id: &str, handle: JoinHandle<()>) {
        if let Some(old) = self.phase_timers.lock().unwrap().insert(room_id.to_string(), handle) {
            old.abort();
        }
    }

    fn clear_phase_timer(&self, room_id: &str) {
        if let Some(handle) = self.phase_timers.lock().unwrap().remove(room_id) {
            handle.abort();
        }
    }

    pub(crate) fn set_removal_task(&self, room_id: &str, session_id: &str, handle: JoinHandle<()>) {
        let key = (room_id.to_string(), session_id.to_string());
        if let Some(old) = self.removal_tasks.lock().unwrap().insert(key, handle) {
            old.abort();
        }
    }

    pub(crate) fn clear_removal_task(&self, room_id: &str, session_id: &str) {
        let key = (room_id.to_string(), session_id.to_string());
        if let Some(handle) = self.removal_tasks.lock().unwrap().remove(&key) {
            handle.abort();
        }
    }

    /// Set the end-turn-in-progress flag. False means an end is already
    /// running and this attempt must be dropped.
    fn begin_ending(&self, room_id: &str) -> bool {
        self.ending.lock().unwrap().insert(room_id.to_string())
    }

    fn finish_ending(&self, room_id: &str) {
        self.ending.lock().unwrap().remove(room_id);
    }

    fn set_candidates(&self, room_id: &str, words: Vec<String>) {
        self.candidates.lock().unwrap().insert(room_id.to_string(), words);
    }

    fn candidates(&self, room_id: &str) -> Option<Vec<String>> {
        self.candidates.lock().unwrap().get(room_id).cloned()
    }

    fn clear_candidates(&self, room_id: &str) {
        self.candidates.lock().unwrap().remove(room_id);
    }

    /// Cancel every timer, flag, and cached value for a room. Called on room
    /// deletion and game over.
    pub fn teardown(&self, room_id: &str) {
        self.abort_tick(room_id);
        self.clear_phase_timer(room_id);
        let mut removals = self.removal_tasks.lock().unwrap();
        removals.retain(|(rid, _), handle| {
            if rid == room_id {
                handle.abort();
                false
            } else {
                true
            }
        });
        drop(removals);
        self.finish_ending(room_id);
        self.clear_candidates(room_id);
        self.locks.lock().unwrap().remove(room_id);
    }
}

impl Default for EngineRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SCORING & HINT SCHEDULE
// =============================================================================

/// Points for a correct guess: the remaining time snaps down to a 5-second
/// plateau, scales against the 60-second reference turn, and never drops
/// below the floor.
#[must_use]
pub fn guess_points(time_left: u64) -> i64 {
    let plateau = (time_left as i64 / 5) * 5;
    (MAX_POINTS * plateau / TURN_SECONDS).max(MIN_POINTS)
}

/// Whether a hint reveal is due at this remaining time. The first uncovers
/// at half time while more than 15 s remain; the second at 15 s. Reveal
/// counts above two never trigger.
#[must_use]
pub fn hint_due(draw_time: u32, time_left: u64, revealed: usize) -> bool {
    if time_left == 0 || revealed >= 2 {
        return false;
    }
    let half = u64::from(draw_time) / 2;
    if revealed == 0 && time_left <= half && time_left > 15 {
        return true;
    }
    time_left <= 15
}

// =============================================================================
// GAME START
// =============================================================================

/// Host starts the game. Broadcasts `gameStarted` and enters the first
/// CHOOSING phase.
///
/// # Errors
///
/// Rejects non-hosts, short rosters, and already-running games.
pub async fn start_game(state: &AppState, room_id: &str, session_id: &str) -> Result<(), GameError> {
    let (room, ()) = store::update_room(&state.pool, room_id, |room: &mut Room| {
        if !room.is_host(session_id) {
            return Err(GameError::NotHost);
        }
        room.start_game()?;
        Ok(())
    })
    .await?;

    info!(%room_id, players = room.players.len(), "game started");
    state
        .gateway
        .broadcast(
            room_id,
            &ServerEvent::GameStarted { players: room.player_views(), round: room.round },
            None,
        )
        .await;

    start_turn(state, room_id).await
}

// =============================================================================
// CHOOSING
// =============================================================================

/// Enter CHOOSING for the current drawer slot: offer candidate words to the
/// drawer, announce the selection pause to everyone else, and arm the
/// auto-pick timeout.
pub async fn start_turn(state: &AppState, room_id: &str) -> Result<(), GameError> {
    let lock = state.engine.room_lock(room_id);
    let _guard = lock.lock().await;

    let (room, proceed) = store::update_room(&state.pool, room_id, |room: &mut Room| {
        // The game may have ended between scheduling and firing.
        if !room.game_started {
            return Ok::<_, GameError>(false);
        }
        room.begin_choosing();
        Ok(true)
    })
    .await?;

    if !proceed {
        return Ok(());
    }
    let Some(drawer) = room.drawer().cloned() else {
        return Ok(());
    };

    let offered = words::candidates(
        usize::from(room.word_count),
        &room.custom_words,
        room.custom_word_probability,
    );
    state.engine.set_candidates(room_id, offered.clone());

    info!(%room_id, drawer = %drawer.session_id, round = room.round, "turn started");

    state
        .gateway
        .send_to_session(room_id, &drawer.session_id, ServerEvent::SelectWord { words: offered })
        .await;
    state
        .gateway
        .broadcast(
            room_id,
            &ServerEvent::DrawerSelecting {
                drawer_name: drawer.name.clone(),
                players: room.player_views(),
            },
            drawer.socket_id,
        )
        .await;

    let task_state = state.clone();
    let task_room = room_id.to_string();
    state.engine.set_phase_timer(
        room_id,
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(CHOOSE_SECONDS)).await;
            if let Err(e) = auto_select_word(&task_state, &task_room).await {
                warn!(error = %e, room_id = %task_room, "auto word selection failed");
            }
        }),
    );

    Ok(())
}

/// Drawer picked a word; cancels the auto-pick timeout.
///
/// # Errors
///
/// Rejects non-drawers, words that were not offered, and rooms not in
/// CHOOSING.
pub async fn word_selected(
    state: &AppState,
    room_id: &str,
    session_id: &str,
    word: &str,
) -> Result<(), GameError> {
    begin_drawing_phase(state, room_id, word.to_string(), Some(session_id)).await
}

async fn auto_select_word(state: &AppState, room_id: &str) -> Result<(), GameError> {
    let Some(offered) = state.engine.candidates(room_id) else {
        return Ok(());
    };
    let Some(word) = offered.choose(&mut rand::rng()).cloned() else {
        return Ok(());
    };
    begin_drawing_phase(state, room_id, word, None).await
}

// =============================================================================
// DRAWING
// =============================================================================

/// CHOOSING → DRAWING. `by` enforces the drawer-only rule for explicit
/// selections; auto-picks pass `None`.
async fn begin_drawing_phase(
    state: &AppState,
    room_id: &str,
    word: String,
    by: Option<&str>,
) -> Result<(), GameError> {
    let lock = state.engine.room_lock(room_id);
    let _guard = lock.lock().await;

    let offered = state.engine.candidates(room_id).ok_or(GameError::NotChoosing)?;
    if !offered.contains(&word) {
        return Err(GameError::WordNotOffered);
    }

    let now = now_ms();
    let selected = word.clone();
    let (room, ()) = store::update_room(&state.pool, room_id, move |room: &mut Room| {
        if room.phase != Phase::Choosing {
            return Err(GameError::NotChoosing);
        }
        if let Some(session_id) = by {
            if room.drawer_session_id() != Some(session_id) {
                return Err(GameError::NotDrawer);
            }
        }
        room.begin_drawing(selected.clone(), now);
        Ok(())
    })
    .await?;

    state.engine.clear_phase_timer(room_id);
    state.engine.clear_candidates(room_id);

    let drawer = room.drawer().cloned();
    if let Some(drawer) = &drawer {
        state
            .gateway
            .send_to_session(room_id, &drawer.session_id, ServerEvent::YourWord { word })
            .await;
    }

    // Fresh canvas for the new turn, then the fully masked hint to guessers.
    state.gateway.broadcast(room_id, &ServerEvent::ClearCanvas, None).await;
    store::clear_drawing_detached(&state.pool, room_id);
    if let Some(hint) = room.word_hint() {
        state
            .gateway
            .broadcast(room_id, &ServerEvent::HintUpdate { hint }, drawer.and_then(|d| d.socket_id))
            .await;
    }

    spawn_tick_loop(state, room_id);
    Ok(())
}

/// One 1000 ms interval per drawing room. Strictly replaces any previous
/// interval for the room.
fn spawn_tick_loop(state: &AppState, room_id: &str) {
    let task_state = state.clone();
    let task_room = room_id.to_string();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(1000));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = run_tick(&task_state, &task_room).await {
                warn!(error = %e, room_id = %task_room, "tick failed; continuing");
            }
        }
    });
    state.engine.set_tick_task(room_id, handle);
}

async fn run_tick(state: &AppState, room_id: &str) -> Result<(), GameError> {
    let room = store::load(&state.pool, room_id).await?;
    if room.phase != Phase::Drawing {
        return Ok(());
    }

    let time_left = room.time_left_secs(now_ms());
    state.gateway.broadcast(room_id, &ServerEvent::Tick { time_left }, None).await;

    if hint_due(room.draw_time, time_left, room.revealed_letters.len()) {
        reveal_hint(state, room_id).await?;
    }

    let everyone_guessed =
        room.eligible_guessers() > 0 && room.correct_guessers.len() >= room.eligible_guessers();
    if time_left == 0 || everyone_guessed {
        request_end_turn(state, room_id);
    }
    Ok(())
}

/// Uncover one random hidden index and broadcast the updated mask.
async fn reveal_hint(state: &AppState, room_id: &str) -> Result<(), GameError> {
    let (room, revealed) = store::update_room(&state.pool, room_id, |room: &mut Room| {
        let hidden = room.hidden_indices();
        if hidden.is_empty() {
            return Ok::<_, GameError>(false);
        }
        let index = hidden[rand::rng().random_range(0..hidden.len())];
        Ok(room.reveal(index))
    })
    .await?;

    if revealed {
        if let Some(hint) = room.word_hint() {
            let drawer_socket = room.drawer().and_then(|d| d.socket_id);
            state
                .gateway
                .broadcast(room_id, &ServerEvent::HintUpdate { hint }, drawer_socket)
                .await;
        }
    }
    Ok(())
}

// =============================================================================
// GUESSES
// =============================================================================

/// Evaluate a cleaned guess: exact match scores (broadcast before persist),
/// distance-1 earns a private close-guess notice, everything non-matching
/// flows on as ordinary chat.
///
/// # Errors
///
/// Returns `NotMember` for sessions not on the roster and store errors from
/// the fast-path reads.
pub async fn handle_guess(
    state: &AppState,
    room_id: &str,
    session_id: &str,
    cleaned: String,
) -> Result<(), GameError> {
    let room = store::load(&state.pool, room_id).await?;
    let Some(player) = room.player(session_id) else {
        return Err(GameError::NotMember);
    };
    let name = player.name.clone();
    let now = now_ms();

    let normalized = words::normalize_guess(&cleaned);
    let normalized_word = room.current_word.as_deref().map(words::normalize_guess);
    let drawing = room.phase == Phase::Drawing;
    let is_drawer = room.drawer_session_id() == Some(session_id);

    if drawing && !normalized.is_empty() && normalized_word.as_deref() == Some(normalized.as_str())
    {
        // Matching guesses are never echoed into chat; the drawer and
        // already-credited sessions are silently swallowed.
        if is_drawer || room.correct_guessers.contains(session_id) {
            return Ok(());
        }

        let time_left = room.time_left_secs(now);
        let points = guess_points(time_left);

        // Broadcast before persisting; the store's conditional credit makes
        // a racing duplicate harmless.
        let mut preview = room.clone();
        preview.credit_guess(session_id, points);
        state
            .gateway
            .broadcast(
                room_id,
                &ServerEvent::CorrectGuess {
                    session_id: session_id.to_string(),
                    name,
                    points,
                    players: preview.player_views(),
                },
                None,
            )
            .await;

        let credited = store::apply_correct_guess(&state.pool, room_id, session_id, points).await?;
        if credited {
            let room = store::load(&state.pool, room_id).await?;
            let everyone_guessed = room.phase == Phase::Drawing
                && room.eligible_guessers() > 0
                && room.correct_guessers.len() >= room.eligible_guessers();
            if everyone_guessed {
                request_end_turn(state, room_id);
            }
        }
        return Ok(());
    }

    if drawing && !is_drawer {
        let close = normalized_word
            .as_deref()
            .is_some_and(|w| w.chars().count() >= 3 && words::levenshtein(&normalized, w) == 1);
        if close {
            state
                .gateway
                .send_to_session(
                    room_id,
                    session_id,
                    ServerEvent::CloseGuess { message: "You are very close!".to_string() },
                )
                .await;
        }
    }

    let entry = ChatEntry { session_id: session_id.to_string(), name, msg: cleaned, ts: now };
    state
        .gateway
        .broadcast(
            room_id,
            &ServerEvent::Chat {
                session_id: entry.session_id.clone(),
                name: entry.name.clone(),
                msg: entry.msg.clone(),
                ts: entry.ts,
            },
            None,
        )
        .await;
    store::append_chat_detached(&state.pool, room_id, entry);
    Ok(())
}

// =============================================================================
// END OF TURN
// =============================================================================

/// Request an end of turn from a hot path (tick deadline, all-guessed).
/// Runs detached so the tick task can be aborted safely from within the end
/// sequence; the `ending` flag deduplicates racing requests.
pub fn request_end_turn(state: &AppState, room_id: &str) {
    let task_state = state.clone();
    let task_room = room_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = end_turn(&task_state, &task_room).await {
            warn!(error = %e, room_id = %task_room, "end turn failed");
        }
    });
}

/// DRAWING → INTERMISSION: settle the drawer bonus, broadcast `turnEnded`,
/// and arm the intermission timer. Re-entrant calls while an end is in
/// flight are dropped.
///
/// # Errors
///
/// Propagates store failures; the flag is released on error.
pub async fn end_turn(state: &AppState, room_id: &str) -> Result<(), GameError> {
    if !state.engine.begin_ending(room_id) {
        return Ok(());
    }
    let result = end_turn_inner(state, room_id).await;
    if result.is_err() {
        state.engine.finish_ending(room_id);
    }
    result
}

async fn end_turn_inner(state: &AppState, room_id: &str) -> Result<(), GameError> {
    let lock = state.engine.room_lock(room_id);
    let _guard = lock.lock().await;

    state.engine.abort_tick(room_id);
    state.engine.clear_phase_timer(room_id);

    let (room, summary) = store::update_room(&state.pool, room_id, |room: &mut Room| {
        if room.phase != Phase::Drawing {
            return Ok::<_, GameError>(None);
        }
        Ok(Some(room.finish_turn(DRAWER_BONUS_PER_GUESSER)))
    })
    .await?;

    let Some(summary) = summary else {
        state.engine.finish_ending(room_id);
        return Ok(());
    };

    info!(
        %room_id,
        word = %summary.word,
        guessers = summary.correct_guessers.len(),
        "turn ended"
    );
    state
        .gateway
        .broadcast(
            room_id,
            &ServerEvent::TurnEnded {
                word: summary.word,
                players: room.player_views(),
                correct_guessers: summary.correct_guessers,
                drawer_bonus: summary.drawer_bonus,
            },
            None,
        )
        .await;

    let task_state = state.clone();
    let task_room = room_id.to_string();
    state.engine.set_phase_timer(
        room_id,
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(INTERMISSION_SECONDS)).await;
            if let Err(e) = next_turn(&task_state, &task_room).await {
                warn!(error = %e, room_id = %task_room, "turn rotation failed");
            }
        }),
    );

    // The flag may clear only once the intermission is scheduled.
    state.engine.finish_ending(room_id);
    Ok(())
}

/// INTERMISSION → CHOOSING (rotating the drawer) or GAMEOVER.
async fn next_turn(state: &AppState, room_id: &str) -> Result<(), GameError> {
    let advance = {
        let lock = state.engine.room_lock(room_id);
        let _guard = lock.lock().await;
        let (_, advance) = store::update_room(&state.pool, room_id, |room: &mut Room| {
            if room.phase != Phase::Intermission {
                return Ok::<_, GameError>(None);
            }
            Ok(Some(room.advance_turn()))
        })
        .await?;
        advance
    };

    match advance {
        None => Ok(()),
        Some(TurnAdvance::GameOver) => game_over(state, room_id).await,
        Some(TurnAdvance::NextTurn) => start_turn(state, room_id).await,
    }
}

/// Terminal for the game: broadcast final standings and return to LOBBY.
async fn game_over(state: &AppState, room_id: &str) -> Result<(), GameError> {
    let room = {
        let lock = state.engine.room_lock(room_id);
        let _guard = lock.lock().await;
        let (room, ()) = store::update_room(&state.pool, room_id, |room: &mut Room| {
            room.end_game();
            Ok::<_, GameError>(())
        })
        .await?;
        room
    };

    info!(%room_id, "game over");
    state
        .gateway
        .broadcast(room_id, &ServerEvent::GameOver { players: room.player_views() }, None)
        .await;
    state.engine.teardown(room_id);
    Ok(())
}

// =============================================================================
// DISCONNECTS & REMOVAL
// =============================================================================

/// Transport dropped: mark the session disconnected (only if this socket is
/// still its current binding), announce it, and arm the reconnect-grace
/// removal. The engine itself keeps running.
///
/// # Errors
///
/// Propagates store failures.
pub async fn handle_disconnect(
    state: &AppState,
    room_id: &str,
    session_id: &str,
    socket_id: Uuid,
) -> Result<(), GameError> {
    let now = now_ms();
    let (room, changed) = store::update_room(&state.pool, room_id, |room: &mut Room| {
        let current = room.player(session_id).and_then(|p| p.socket_id);
        if current != Some(socket_id) {
            // A newer socket already re-bound this session.
            return Ok::<_, GameError>(false);
        }
        Ok(room.mark_disconnected(session_id, now))
    })
    .await?;

    if !changed {
        return Ok(());
    }

    info!(%room_id, %session_id, "player disconnected");
    state
        .gateway
        .broadcast(
            room_id,
            &ServerEvent::PlayerDisconnected {
                session_id: session_id.to_string(),
                players: room.player_views(),
            },
            None,
        )
        .await;

    let task_state = state.clone();
    let task_room = room_id.to_string();
    let task_session = session_id.to_string();
    state.engine.set_removal_task(
        room_id,
        session_id,
        tokio::spawn(async move {
            tokio::time::sleep(RECONNECT_GRACE).await;
            if let Err(e) =
                remove_if_still_disconnected(&task_state, &task_room, &task_session).await
            {
                warn!(error = %e, room_id = %task_room, "grace removal failed");
            }
        }),
    );
    Ok(())
}

/// Grace expired: drop the session from the roster so rotation re-indexes
/// over the live list. Ends the turn when the departed player was drawing,
/// and the game when the roster falls below the minimum.
async fn remove_if_still_disconnected(
    state: &AppState,
    room_id: &str,
    session_id: &str,
) -> Result<(), GameError> {
    state.engine.clear_removal_task(room_id, session_id);

    let (room, outcome) = {
        let lock = state.engine.room_lock(room_id);
        let _guard = lock.lock().await;
        store::update_room(&state.pool, room_id, |room: &mut Room| {
            match room.player(session_id) {
                Some(p) if !p.is_connected => {}
                _ => return Ok::<_, GameError>(None),
            }
            let Some(removed) = room.remove_player(session_id) else {
                return Ok(None);
            };

            let mut ended_word = None;
            if removed.was_drawer {
                // Removal already slid the next player into the drawer slot,
                // so the end path must not rotate again.
                if removed.wrapped {
                    room.round += 1;
                }
                if room.phase == Phase::Drawing {
                    ended_word = Some(room.finish_turn(0).word);
                }
                room.phase = Phase::Intermission;
            }
            Ok(Some((removed, ended_word)))
        })
        .await?
    };

    let Some((removed, ended_word)) = outcome else {
        return Ok(());
    };

    info!(%room_id, %session_id, "player removed after reconnect grace");
    state
        .gateway
        .broadcast(
            room_id,
            &ServerEvent::PlayerDisconnected {
                session_id: session_id.to_string(),
                players: room.player_views(),
            },
            None,
        )
        .await;

    if room.players.is_empty() {
        // The idle sweeper deletes empty rooms.
        return Ok(());
    }

    if room.game_started && room.players.len() < MIN_PLAYERS_TO_START {
        return game_over(state, room_id).await;
    }

    if removed.was_drawer {
        state.engine.abort_tick(room_id);
        state.engine.clear_phase_timer(room_id);
        state.engine.clear_candidates(room_id);

        if room.round > room.max_rounds {
            return game_over(state, room_id).await;
        }

        if let Some(word) = ended_word {
            state
                .gateway
                .broadcast(
                    room_id,
                    &ServerEvent::TurnEnded {
                        word,
                        players: room.player_views(),
                        correct_guessers: Vec::new(),
                        drawer_bonus: 0,
                    },
                    None,
                )
                .await;
        }

        let task_state = state.clone();
        let task_room = room_id.to_string();
        state.engine.set_phase_timer(
            room_id,
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(INTERMISSION_SECONDS)).await;
                if let Err(e) = start_turn(&task_state, &task_room).await {
                    warn!(error = %e, room_id = %task_room, "post-removal turn start failed");
                }
            }),
        );
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
