use super::*;

// =============================================================================
// SCORING
// =============================================================================

#[test]
fn points_decay_on_five_second_plateaus() {
    // 58s left snaps to the 55s plateau: floor(500 * 55 / 60) = 458.
    assert_eq!(guess_points(58), 458);
    assert_eq!(guess_points(55), 458);
    assert_eq!(guess_points(56), guess_points(55));
    assert_eq!(guess_points(54), guess_points(50));
}

#[test]
fn points_at_full_time_hit_the_maximum() {
    assert_eq!(guess_points(60), MAX_POINTS);
}

#[test]
fn points_never_drop_below_the_floor() {
    assert_eq!(guess_points(0), MIN_POINTS);
    assert_eq!(guess_points(3), MIN_POINTS);
    assert_eq!(guess_points(5), MIN_POINTS);
}

#[test]
fn points_are_monotone_in_remaining_time() {
    // Two correct guesses at t1 > t2 can never invert: points(t1) >= points(t2).
    for earlier in 0..=60u64 {
        for later in 0..earlier {
            assert!(
                guess_points(earlier) >= guess_points(later),
                "points({earlier}) < points({later})"
            );
        }
    }
}

#[test]
fn plateau_boundaries_step_exactly_at_multiples_of_five() {
    assert_eq!(guess_points(50), 500 * 50 / 60);
    assert_eq!(guess_points(49), 500 * 45 / 60);
    assert_eq!(guess_points(45), 500 * 45 / 60);
}

// =============================================================================
// HINT SCHEDULE
// =============================================================================

#[test]
fn first_hint_fires_at_half_time() {
    assert!(!hint_due(60, 31, 0));
    assert!(hint_due(60, 30, 0));
    // A skipped tick still triggers on the next observation.
    assert!(hint_due(60, 29, 0));
}

#[test]
fn second_hint_fires_at_fifteen_seconds() {
    assert!(!hint_due(60, 16, 1));
    assert!(hint_due(60, 15, 1));
    assert!(hint_due(60, 10, 1));
}

#[test]
fn no_third_hint_ever() {
    for t in 0..=60u64 {
        assert!(!hint_due(60, t, 2));
        assert!(!hint_due(60, t, 3));
    }
}

#[test]
fn no_hint_after_the_deadline() {
    assert!(!hint_due(60, 0, 0));
    assert!(!hint_due(60, 0, 1));
}

#[test]
fn first_hint_waits_until_below_half_but_above_fifteen() {
    // With a 60s turn the first reveal window is (15, 30].
    assert!(!hint_due(60, 45, 0));
    assert!(hint_due(60, 20, 0));
}

#[test]
fn short_turns_degenerate_to_the_fifteen_second_reveals() {
    // draw_time 30 halves to 15, so the >15 window is empty and both
    // reveals ride the 15-second trigger.
    assert!(!hint_due(30, 16, 0));
    assert!(hint_due(30, 15, 0));
    assert!(hint_due(30, 14, 1));
}

#[test]
fn long_turns_first_reveal_at_ninety_seconds() {
    assert!(!hint_due(180, 91, 0));
    assert!(hint_due(180, 90, 0));
}

// =============================================================================
// END-TURN FLAG
// =============================================================================

#[test]
fn ending_flag_drops_reentrant_attempts() {
    let runtime = EngineRuntime::new();
    assert!(runtime.begin_ending("AB12CD"));
    assert!(!runtime.begin_ending("AB12CD"));
    runtime.finish_ending("AB12CD");
    assert!(runtime.begin_ending("AB12CD"));
}

#[test]
fn ending_flags_are_per_room() {
    let runtime = EngineRuntime::new();
    assert!(runtime.begin_ending("AB12CD"));
    assert!(runtime.begin_ending("EF34GH"));
}

#[test]
fn candidates_round_trip_and_clear() {
    let runtime = EngineRuntime::new();
    let offered = vec!["house".to_string(), "mouse".to_string()];
    runtime.set_candidates("AB12CD", offered.clone());
    assert_eq!(runtime.candidates("AB12CD"), Some(offered));
    runtime.clear_candidates("AB12CD");
    assert_eq!(runtime.candidates("AB12CD"), None);
}

#[test]
fn teardown_clears_flags_and_candidates() {
    let runtime = EngineRuntime::new();
    runtime.begin_ending("AB12CD");
    runtime.set_candidates("AB12CD", vec!["house".to_string()]);
    runtime.teardown("AB12CD");
    assert!(runtime.begin_ending("AB12CD"));
    assert_eq!(runtime.candidates("AB12CD"), None);
}

#[tokio::test]
async fn room_lock_is_shared_per_room() {
    let runtime = EngineRuntime::new();
    let a = runtime.room_lock("AB12CD");
    let b = runtime.room_lock("AB12CD");
    let guard = a.lock().await;
    assert!(b.try_lock().is_err());
    drop(guard);
    assert!(b.try_lock().is_ok());
}
