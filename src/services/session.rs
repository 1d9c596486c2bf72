//! Session and room identifier generation.
//!
//! DESIGN
//! ======
//! Session ids are `"session_"` + random base-36 + base-36-encoded timestamp,
//! stable across reconnects. Room ids are 6 uppercase base-36 characters;
//! collisions are handled by the caller retrying against the store's
//! uniqueness check.

use rand::Rng;

use crate::event::now_ms;

const SESSION_PREFIX: &str = "session_";
pub const ROOM_ID_LEN: usize = 6;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Generate a fresh session id.
#[must_use]
pub fn generate_session_id() -> String {
    let random_part = to_base36(rand::rng().random::<u64>());
    let time_part = to_base36(now_ms().unsigned_abs());
    format!("{SESSION_PREFIX}{random_part}{time_part}")
}

/// Generate a 6-character uppercase base-36 room id.
#[must_use]
pub fn generate_room_id() -> String {
    let mut rng = rand::rng();
    (0..ROOM_ID_LEN)
        .map(|_| BASE36[rng.random_range(0..36)].to_ascii_uppercase() as char)
        .collect()
}

/// Normalize a client-supplied room id: trim, uppercase, and require exactly
/// 6 base-36 characters. `None` for anything else.
#[must_use]
pub fn normalize_room_id(raw: &str) -> Option<String> {
    let id = raw.trim().to_ascii_uppercase();
    if id.len() == ROOM_ID_LEN && id.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
        Some(id)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_carry_the_prefix_and_differ() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert!(a.starts_with(SESSION_PREFIX));
        assert!(a.len() > SESSION_PREFIX.len());
        assert_ne!(a, b);
    }

    #[test]
    fn room_ids_are_six_uppercase_base36_chars() {
        for _ in 0..50 {
            let id = generate_room_id();
            assert_eq!(id.len(), ROOM_ID_LEN);
            assert!(id.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn normalize_room_id_uppercases_and_validates() {
        assert_eq!(normalize_room_id(" ab12cd "), Some("AB12CD".to_string()));
        assert_eq!(normalize_room_id("AB12CD"), Some("AB12CD".to_string()));
        assert!(normalize_room_id("short").is_none());
        assert!(normalize_room_id("toolong1").is_none());
        assert!(normalize_room_id("AB12C!").is_none());
    }

    #[test]
    fn base36_encodes_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
