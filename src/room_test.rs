use super::*;

fn player(session_id: &str) -> Player {
    Player::new(session_id.to_string(), format!("name-{session_id}"), [1, 2, 3, 4], Uuid::new_v4(), 1_000)
}

fn room_with_players(n: usize) -> Room {
    let mut room = Room::new("ABC123".into(), 1_000);
    for i in 0..n {
        room.add_player(player(&format!("s{i}"))).unwrap();
    }
    room
}

fn started_room(n: usize) -> Room {
    let mut room = room_with_players(n);
    room.start_game().unwrap();
    room.begin_choosing();
    room
}

fn drawing_room(n: usize, word: &str) -> Room {
    let mut room = started_room(n);
    room.begin_drawing(word.to_string(), 10_000);
    room
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[test]
fn new_room_defaults() {
    let room = Room::new("ABC123".into(), 1_000);
    assert_eq!(room.max_players, 8);
    assert_eq!(room.max_rounds, 3);
    assert_eq!(room.draw_time, 60);
    assert_eq!(room.word_count, 3);
    assert_eq!(room.phase, Phase::Lobby);
    assert!(!room.game_started);
    assert_eq!(room.drawer_index, 0);
}

#[test]
fn start_game_requires_two_players() {
    let mut room = room_with_players(1);
    assert_eq!(room.start_game(), Err(RuleError::NotEnoughPlayers));

    room.add_player(player("s1")).unwrap();
    assert!(room.start_game().is_ok());
    assert!(room.game_started);
    assert_eq!(room.round, 1);
    assert_eq!(room.drawer_index, 0);
}

#[test]
fn start_game_twice_is_rejected() {
    let mut room = room_with_players(2);
    room.start_game().unwrap();
    assert_eq!(room.start_game(), Err(RuleError::AlreadyStarted));
}

#[test]
fn start_game_resets_scores() {
    let mut room = room_with_players(2);
    room.players[0].score = 900;
    room.start_game().unwrap();
    assert!(room.players.iter().all(|p| p.score == 0));
}

#[test]
fn add_player_rejects_full_room() {
    let mut room = Room::new("ABC123".into(), 0);
    room.max_players = 2;
    room.add_player(player("a")).unwrap();
    room.add_player(player("b")).unwrap();
    assert_eq!(room.add_player(player("c")), Err(RuleError::RoomFull));
}

// =============================================================================
// DRAWER INDEX INVARIANT
// =============================================================================

#[test]
fn clamped_drawer_index_empty_room_is_zero() {
    let room = Room::new("ABC123".into(), 0);
    assert_eq!(room.clamped_drawer_index(), 0);
    assert!(room.drawer().is_none());
}

#[test]
fn clamped_drawer_index_stays_in_bounds() {
    let mut room = room_with_players(3);
    room.drawer_index = 99;
    assert_eq!(room.clamped_drawer_index(), 2);
}

#[test]
fn exactly_one_drawer_flag_in_active_phases() {
    let room = drawing_room(3, "house");
    let drawers: Vec<_> = room.player_views().into_iter().filter(|p| p.is_drawer).collect();
    assert_eq!(drawers.len(), 1);
    assert_eq!(drawers[0].session_id, "s0");
}

#[test]
fn no_drawer_flag_in_lobby_or_intermission() {
    let mut room = room_with_players(3);
    assert!(room.player_views().iter().all(|p| !p.is_drawer));

    room.start_game().unwrap();
    room.begin_choosing();
    room.begin_drawing("house".into(), 0);
    room.finish_turn(50);
    assert_eq!(room.phase, Phase::Intermission);
    assert!(room.player_views().iter().all(|p| !p.is_drawer));
}

// =============================================================================
// ROTATION LAW
// =============================================================================

#[test]
fn rotation_visits_every_player_then_increments_round() {
    let mut room = started_room(3);
    let mut seen = Vec::new();

    for _ in 0..3 {
        seen.push(room.clamped_drawer_index());
        room.begin_drawing("word".into(), 0);
        room.finish_turn(50);
        let advance = room.advance_turn();
        if advance == TurnAdvance::NextTurn {
            room.begin_choosing();
        }
    }

    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(room.round, 2);
}

#[test]
fn game_over_after_max_rounds() {
    let mut room = started_room(2);
    room.max_rounds = 1;

    room.begin_drawing("word".into(), 0);
    room.finish_turn(50);
    assert_eq!(room.advance_turn(), TurnAdvance::NextTurn); // drawer 1, round 1

    room.begin_choosing();
    room.begin_drawing("word".into(), 0);
    room.finish_turn(50);
    assert_eq!(room.advance_turn(), TurnAdvance::GameOver); // wrap, round 2 > 1
    assert_eq!(room.round, 2);
}

#[test]
fn round_never_exceeds_max_plus_one() {
    let mut room = started_room(2);
    room.max_rounds = 3;
    for _ in 0..6 {
        room.begin_choosing();
        room.begin_drawing("word".into(), 0);
        room.finish_turn(50);
        if room.advance_turn() == TurnAdvance::GameOver {
            break;
        }
    }
    assert!(room.round <= room.max_rounds + 1);
}

#[test]
fn end_game_returns_to_lobby_keeping_scores() {
    let mut room = drawing_room(2, "house");
    room.credit_guess("s1", 400);
    room.finish_turn(50);
    room.end_game();

    assert!(!room.game_started);
    assert_eq!(room.phase, Phase::Lobby);
    assert!(room.current_word.is_none());
    assert_eq!(room.player("s1").unwrap().score, 400);
}

// =============================================================================
// GUESS CREDIT
// =============================================================================

#[test]
fn credit_guess_awards_once_per_session() {
    let mut room = drawing_room(3, "house");
    assert!(room.credit_guess("s1", 458));
    assert!(!room.credit_guess("s1", 458));
    assert_eq!(room.player("s1").unwrap().score, 458);
    assert_eq!(room.round_points.get("s1"), Some(&458));
}

#[test]
fn credit_guess_never_credits_the_drawer() {
    let mut room = drawing_room(3, "house");
    assert!(!room.credit_guess("s0", 500));
    assert!(!room.correct_guessers.contains("s0"));
}

#[test]
fn credit_guess_ignores_unknown_sessions() {
    let mut room = drawing_room(2, "house");
    assert!(!room.credit_guess("ghost", 100));
}

#[test]
fn credit_guess_outside_drawing_phase_is_ignored() {
    let mut room = started_room(2);
    assert_eq!(room.phase, Phase::Choosing);
    assert!(!room.credit_guess("s1", 100));
}

#[test]
fn round_points_sum_equals_turn_score_delta() {
    let mut room = drawing_room(3, "house");
    let before: i64 = room.players.iter().map(|p| p.score).sum();

    room.credit_guess("s1", 458);
    room.credit_guess("s2", 330);
    let summary = room.finish_turn(50);

    let after: i64 = room.players.iter().map(|p| p.score).sum();
    let round_total: i64 = room.round_points.values().sum();
    assert_eq!(after - before, round_total);
    assert_eq!(summary.drawer_bonus, 100);
    assert_eq!(round_total, 458 + 330 + 100);
}

#[test]
fn finish_turn_without_guessers_pays_no_bonus() {
    let mut room = drawing_room(2, "house");
    let summary = room.finish_turn(50);
    assert_eq!(summary.drawer_bonus, 0);
    assert_eq!(summary.word, "house");
    assert!(summary.correct_guessers.is_empty());
    assert_eq!(room.player("s0").unwrap().score, 0);
}

// =============================================================================
// HINTS
// =============================================================================

#[test]
fn reveal_grows_monotonically_and_stays_in_bounds() {
    let mut room = drawing_room(2, "house");
    assert!(room.reveal(0));
    assert!(!room.reveal(0));
    assert!(!room.reveal(5));
    assert!(room.reveal(4));
    assert_eq!(room.revealed_letters.len(), 2);
}

#[test]
fn hidden_indices_shrink_as_letters_reveal() {
    let mut room = drawing_room(2, "house");
    assert_eq!(room.hidden_indices(), vec![0, 1, 2, 3, 4]);
    room.reveal(2);
    assert_eq!(room.hidden_indices(), vec![0, 1, 3, 4]);
}

#[test]
fn word_hint_masks_unrevealed_letters() {
    let mut room = drawing_room(2, "house");
    assert_eq!(room.word_hint().unwrap(), "_ _ _ _ _");
    room.reveal(0);
    assert_eq!(room.word_hint().unwrap(), "h _ _ _ _");
}

// =============================================================================
// TIMING
// =============================================================================

#[test]
fn time_left_rounds_up_and_floors_at_zero() {
    let mut room = drawing_room(2, "house");
    room.turn_ends_at = 10_000;
    assert_eq!(room.time_left_secs(9_999), 1);
    assert_eq!(room.time_left_secs(5_000), 5);
    assert_eq!(room.time_left_secs(10_000), 0);
    assert_eq!(room.time_left_secs(20_000), 0);
}

#[test]
fn begin_drawing_sets_deadline_from_draw_time() {
    let mut room = started_room(2);
    room.draw_time = 90;
    room.begin_drawing("house".into(), 1_000);
    assert_eq!(room.turn_ends_at, 1_000 + 90_000);
    assert_eq!(room.time_left_secs(1_000), 90);
}

// =============================================================================
// MEMBERSHIP & REMOVAL
// =============================================================================

#[test]
fn bind_socket_reconnects_a_session() {
    let mut room = room_with_players(2);
    room.mark_disconnected("s1", 2_000);
    assert!(!room.player("s1").unwrap().is_connected);

    let socket = Uuid::new_v4();
    assert!(room.bind_socket("s1", socket, 3_000));
    let p = room.player("s1").unwrap();
    assert!(p.is_connected);
    assert_eq!(p.socket_id, Some(socket));
    assert_eq!(p.last_seen, 3_000);
}

#[test]
fn host_shifts_to_first_connected_player() {
    let mut room = room_with_players(3);
    assert!(room.is_host("s0"));

    room.mark_disconnected("s0", 0);
    assert!(room.is_host("s1"));
    assert!(!room.is_host("s0"));

    let views = room.player_views();
    assert!(views.iter().find(|v| v.session_id == "s1").unwrap().is_host);
}

#[test]
fn remove_player_before_drawer_shifts_index_down() {
    let mut room = started_room(3);
    room.drawer_index = 2;
    room.remove_player("s0").unwrap();
    assert_eq!(room.drawer_index, 1);
    assert_eq!(room.drawer_session_id(), Some("s2"));
}

#[test]
fn remove_drawer_mid_turn_reports_was_drawer() {
    let mut room = drawing_room(3, "house");
    let removed = room.remove_player("s0").unwrap();
    assert!(removed.was_drawer);
    assert!(!removed.wrapped);
    // The next player slid into the drawer slot.
    assert_eq!(room.drawer_session_id(), Some("s1"));
}

#[test]
fn remove_tail_drawer_wraps_to_head() {
    let mut room = started_room(3);
    room.drawer_index = 2;
    room.begin_drawing("house".into(), 0);
    let removed = room.remove_player("s2").unwrap();
    assert!(removed.was_drawer);
    assert!(removed.wrapped);
    assert_eq!(room.drawer_index, 0);
}

#[test]
fn remove_player_clears_their_turn_bookkeeping() {
    let mut room = drawing_room(3, "house");
    room.credit_guess("s1", 100);
    room.remove_player("s1").unwrap();
    assert!(!room.correct_guessers.contains("s1"));
    assert!(!room.round_points.contains_key("s1"));
}

#[test]
fn remove_last_player_resets_drawer_index() {
    let mut room = room_with_players(1);
    room.remove_player("s0").unwrap();
    assert!(room.players.is_empty());
    assert_eq!(room.drawer_index, 0);
}

#[test]
fn eligible_guessers_counts_connected_non_drawers() {
    let mut room = drawing_room(4, "house");
    assert_eq!(room.eligible_guessers(), 3);
    room.mark_disconnected("s2", 0);
    assert_eq!(room.eligible_guessers(), 2);
}

// =============================================================================
// SETTINGS
// =============================================================================

#[test]
fn apply_settings_clamps_every_field() {
    let mut room = room_with_players(2);
    let patch = SettingsPatch {
        max_players: Some(99),
        max_rounds: Some(0),
        draw_time: Some(5),
        word_count: Some(9),
        custom_words: Some(vec!["  Wolf ".into(), String::new(), "BEAR".into()]),
        custom_word_probability: Some(250),
    };
    room.apply_settings(&patch).unwrap();

    assert_eq!(room.max_players, 15);
    assert_eq!(room.max_rounds, 1);
    assert_eq!(room.draw_time, 30);
    assert_eq!(room.word_count, 5);
    assert_eq!(room.custom_words, vec!["wolf".to_string(), "bear".to_string()]);
    assert_eq!(room.custom_word_probability, 100);
}

#[test]
fn apply_settings_rejected_mid_game() {
    let mut room = started_room(2);
    let patch = SettingsPatch { draw_time: Some(90), ..Default::default() };
    assert_eq!(room.apply_settings(&patch), Err(RuleError::NotInLobby));
    assert_eq!(room.draw_time, 60);
}

#[test]
fn apply_settings_leaves_absent_fields_untouched() {
    let mut room = room_with_players(2);
    let patch = SettingsPatch { max_rounds: Some(5), ..Default::default() };
    room.apply_settings(&patch).unwrap();
    assert_eq!(room.max_rounds, 5);
    assert_eq!(room.draw_time, 60);
    assert_eq!(room.max_players, 8);
}

// =============================================================================
// CHAT RING
// =============================================================================

#[test]
fn chat_ring_trims_to_capacity() {
    let mut room = Room::new("ABC123".into(), 0);
    for i in 0..60 {
        room.push_chat(ChatEntry {
            session_id: "s0".into(),
            name: "ann".into(),
            msg: format!("msg {i}"),
            ts: i,
        });
    }
    assert_eq!(room.chat.len(), CHAT_RING_CAPACITY);
    assert_eq!(room.chat.first().unwrap().msg, "msg 10");
    assert_eq!(room.chat.last().unwrap().msg, "msg 59");
}

// =============================================================================
// SERIALIZATION
// =============================================================================

#[test]
fn room_doc_round_trips_without_hot_path_fields() {
    let mut room = drawing_room(2, "house");
    room.push_chat(ChatEntry { session_id: "s1".into(), name: "n".into(), msg: "hi".into(), ts: 1 });
    room.drawing = serde_json::json!([{"x": 1}]);
    room.version = 7;

    let doc = serde_json::to_value(&room).unwrap();
    assert!(doc.get("chat").is_none());
    assert!(doc.get("drawing").is_none());
    assert!(doc.get("version").is_none());
    assert_eq!(doc["gameStarted"], true);

    let restored: Room = serde_json::from_value(doc).unwrap();
    assert_eq!(restored.current_word.as_deref(), Some("house"));
    assert_eq!(restored.players.len(), 2);
    assert_eq!(restored.version, 0);
    assert!(restored.chat.is_empty());
}

#[test]
fn game_state_snapshot_reflects_drawing_phase() {
    let mut room = drawing_room(2, "house");
    room.turn_ends_at = 50_000;
    let state = room.game_state(20_000);
    assert_eq!(state.time_left, 30);
    assert_eq!(state.word_hint.as_deref(), Some("_ _ _ _ _"));
    assert!(state.game_started);

    room.finish_turn(50);
    let state = room.game_state(20_000);
    assert_eq!(state.time_left, 0);
    assert!(state.word_hint.is_none());
}
