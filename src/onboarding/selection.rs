//! Parsing a farmer's pick from a numbered list, and skip keywords.

use std::sync::LazyLock;

use regex::Regex;

static NUMBER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:number|no\.?|option|#)\s*(\d+|one|two|three|four|five)$")
        .unwrap_or_else(|e| panic!("invalid selection pattern: {e}"))
});

const ORDINALS: &[(&str, usize)] = &[
    ("first", 1),
    ("1st", 1),
    ("second", 2),
    ("2nd", 2),
    ("third", 3),
    ("3rd", 3),
    ("fourth", 4),
    ("4th", 4),
    ("fifth", 5),
    ("5th", 5),
];

const SKIP_KEYWORDS: &[&str] = &["skip", "pass", "next", "no", "n/a", "na"];

/// Parse a selection into a 1-based index.
///
/// Accepts bare digits, "number N" and ordinals up to fifth / 5th anywhere
/// in the reply ("the second one"). Range checking is the caller's job.
pub fn parse_selection(message: &str) -> Option<usize> {
    let text = message
        .trim()
        .trim_end_matches(['.', '!', ')'])
        .trim()
        .to_lowercase();

    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().ok();
    }

    if let Some(caps) = NUMBER_PREFIX.captures(&text) {
        let n = &caps[1];
        return n.parse().ok().or_else(|| word_number(n));
    }

    text.split(|c: char| !c.is_alphanumeric())
        .find_map(|token| {
            ORDINALS
                .iter()
                .find(|(word, _)| *word == token)
                .map(|(_, n)| *n)
        })
}

fn word_number(word: &str) -> Option<usize> {
    match word {
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        _ => None,
    }
}

/// Whether the message asks to skip the current (optional) question.
pub fn is_skip(message: &str) -> bool {
    let normalized = message.trim().trim_end_matches(['.', '!']).to_lowercase();
    SKIP_KEYWORDS.contains(&normalized.as_str())
}
