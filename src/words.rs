//! Word corpus, sampling policy, and guess/hint utilities.
//!
//! DESIGN
//! ======
//! The corpus is embedded and split by difficulty. Dictionary draws are
//! weighted 20% easy / 40% medium / 40% hard; each candidate independently
//! rolls against the room's custom-word probability first. Masking renders
//! one character per position joined by single spaces, `_` for hidden.

use std::collections::BTreeSet;

use rand::seq::IndexedRandom;
use rand::Rng;

// =============================================================================
// CORPUS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

const EASY_WORDS: &[&str] = &[
    "cat", "dog", "sun", "car", "hat", "ball", "fish", "tree", "star", "book",
    "cup", "bed", "key", "sock", "duck", "cake", "moon", "door", "shoe", "frog",
    "bird", "milk", "rain", "snow", "ring", "kite", "leaf", "nose", "hand", "apple",
    "house", "chair", "table", "pizza", "clock", "mouse", "snake", "cloud", "heart", "smile",
    "train", "boat", "bread", "candle", "flower", "ladder", "pencil", "window", "banana", "spider",
];

const MEDIUM_WORDS: &[&str] = &[
    "anchor", "bridge", "camera", "castle", "circus", "dragon", "engine", "forest", "guitar", "hammer",
    "island", "jungle", "kitten", "laptop", "magnet", "napkin", "ocean", "parrot", "pirate", "pocket",
    "rocket", "saddle", "shadow", "shovel", "sponge", "statue", "sunset", "ticket", "tunnel", "turtle",
    "vacuum", "violin", "volcano", "waffle", "walrus", "wizard", "zipper", "balloon", "blanket", "cactus",
    "compass", "dolphin", "faucet", "glacier", "hamster", "lantern", "mermaid", "octopus", "penguin", "pyramid",
    "rainbow", "sandwich", "scarecrow", "skeleton", "snowman", "submarine", "telescope", "tornado", "treasure", "trophy",
    "umbrella", "unicorn", "whistle", "windmill", "astronaut",
];

const HARD_WORDS: &[&str] = &[
    "algorithm", "ambulance", "aquarium", "architect", "avalanche", "binoculars", "blacksmith", "boomerang",
    "bulldozer", "carousel", "cathedral", "chameleon", "chandelier", "coliseum", "conductor", "constellation",
    "drawbridge", "earthquake", "eclipse", "escalator", "fireworks", "flamingo", "fortress", "gargoyle",
    "gondola", "harmonica", "helicopter", "hibernation", "hourglass", "hurricane", "hypnosis", "iceberg",
    "juggler", "kaleidoscope", "labyrinth", "lighthouse", "marathon", "metronome", "microscope", "monastery",
    "mosquito", "nightmare", "observatory", "orchestra", "origami", "parachute", "periscope", "porcupine",
    "quicksand", "rhinoceros", "sasquatch", "scaffolding", "silhouette", "sleepwalker", "stalactite", "stethoscope",
    "tarantula", "thermostat", "trampoline", "tightrope", "ventriloquist", "vertigo", "wheelbarrow", "xylophone",
    "zeppelin",
];

/// Draw one word of the given difficulty uniformly at random.
#[must_use]
pub fn sample_word(difficulty: Difficulty) -> &'static str {
    let mut rng = rand::rng();
    let pool = match difficulty {
        Difficulty::Easy => EASY_WORDS,
        Difficulty::Medium => MEDIUM_WORDS,
        Difficulty::Hard => HARD_WORDS,
    };
    pool.choose(&mut rng).copied().unwrap_or("pencil")
}

/// Draw one word with the 20/40/40 difficulty weighting.
#[must_use]
pub fn sample_weighted() -> &'static str {
    let roll: u8 = rand::rng().random_range(0..100);
    let difficulty = if roll < 20 {
        Difficulty::Easy
    } else if roll < 60 {
        Difficulty::Medium
    } else {
        Difficulty::Hard
    };
    sample_word(difficulty)
}

/// Draw one word uniformly from a custom list. `None` on an empty list.
#[must_use]
pub fn sample_custom(list: &[String]) -> Option<String> {
    list.choose(&mut rand::rng()).cloned()
}

/// Assemble the candidate words offered to a drawer. Each slot independently
/// rolls against `custom_probability` (0-100) before falling back to the
/// weighted dictionary draw.
#[must_use]
pub fn candidates(count: usize, custom_words: &[String], custom_probability: u8) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let use_custom = !custom_words.is_empty()
                && rng.random_range(0..100u8) < custom_probability.min(100);
            if use_custom {
                custom_words
                    .choose(&mut rng)
                    .cloned()
                    .unwrap_or_else(|| sample_weighted().to_string())
            } else {
                sample_weighted().to_string()
            }
        })
        .collect()
}

// =============================================================================
// HINTS & GUESSES
// =============================================================================

/// Render the hint mask: one character per position joined by single spaces,
/// with unrevealed positions shown as `_`.
#[must_use]
pub fn mask_word(word: &str, revealed: &BTreeSet<usize>) -> String {
    word.chars()
        .enumerate()
        .map(|(i, c)| if revealed.contains(&i) { c.to_string() } else { "_".to_string() })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a guess for comparison: trim, lowercase, strip all whitespace.
#[must_use]
pub fn normalize_guess(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Standard Levenshtein distance with unit insert/delete/substitute costs.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            let delete = prev[j + 1] + 1;
            let insert = curr[j] + 1;
            curr[j + 1] = substitute.min(delete).min(insert);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

// =============================================================================
// TESTS
// =============================================================================
