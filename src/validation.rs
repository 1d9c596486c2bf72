//! Input validation and content moderation boundary.
//!
//! DESIGN
//! ======
//! Pure functions: raw text in, cleaned text or a rejection out. Cleaning
//! trims, collapses runs of whitespace, and strips control characters before
//! checking length bounds and the blocklist. Rejections are answered to the
//! offender only and never broadcast.

pub const MAX_NAME_LEN: usize = 24;
pub const MAX_MESSAGE_LEN: usize = 200;

/// Terms rejected anywhere in a display name or message.
const BLOCKED_TERMS: &[&str] = &["admin", "moderator", "system"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text must not be empty")]
    Empty,
    #[error("text exceeds {max} characters")]
    TooLong { max: usize },
    #[error("text contains blocked content")]
    Blocked,
}

fn clean(raw: &str, max: usize) -> Result<String, ValidationError> {
    let cleaned: String = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect();

    if cleaned.is_empty() {
        return Err(ValidationError::Empty);
    }
    if cleaned.chars().count() > max {
        return Err(ValidationError::TooLong { max });
    }

    let lowered = cleaned.to_lowercase();
    if BLOCKED_TERMS.iter().any(|term| lowered.contains(term)) {
        return Err(ValidationError::Blocked);
    }

    Ok(cleaned)
}

/// Validate a display name.
///
/// # Errors
///
/// Rejects empty, over-long, or blocked names.
pub fn clean_name(raw: &str) -> Result<String, ValidationError> {
    clean(raw, MAX_NAME_LEN)
}

/// Validate a chat message.
///
/// # Errors
///
/// Rejects empty, over-long, or blocked messages.
pub fn clean_message(raw: &str) -> Result<String, ValidationError> {
    clean(raw, MAX_MESSAGE_LEN)
}

/// Validate a guess. Guesses share the chat bounds; matching happens on the
/// normalized form afterwards.
///
/// # Errors
///
/// Rejects empty, over-long, or blocked guesses.
pub fn clean_guess(raw: &str) -> Result<String, ValidationError> {
    clean(raw, MAX_MESSAGE_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_name_trims_and_collapses_whitespace() {
        assert_eq!(clean_name("  Ada   Lovelace  ").unwrap(), "Ada Lovelace");
    }

    #[test]
    fn clean_name_rejects_empty() {
        assert_eq!(clean_name("   "), Err(ValidationError::Empty));
    }

    #[test]
    fn clean_name_rejects_over_long() {
        let raw = "x".repeat(MAX_NAME_LEN + 1);
        assert_eq!(clean_name(&raw), Err(ValidationError::TooLong { max: MAX_NAME_LEN }));
    }

    #[test]
    fn clean_name_rejects_blocked_terms_case_insensitively() {
        assert_eq!(clean_name("AdMiN"), Err(ValidationError::Blocked));
    }

    #[test]
    fn clean_message_strips_control_characters() {
        assert_eq!(clean_message("hi\u{7}there").unwrap(), "hithere");
    }

    #[test]
    fn clean_message_allows_normal_text() {
        assert_eq!(clean_message("is it a house?").unwrap(), "is it a house?");
    }
}
