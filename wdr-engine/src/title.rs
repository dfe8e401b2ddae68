//! Title cleanup and search-variation generation
//!
//! Catalog titles often carry bracketed metadata, separator characters, and
//! edition phrases that hurt backend search quality. `clean_title` strips
//! those; `title_variations` produces case variants so unconventionally
//! cased titles (e.g. "motolog") are still found.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bracketed metadata in any of the common bracket styles
static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[【\[(].*?[)\]】]").expect("bracket regex"));

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space regex"));

/// Edition-related phrases removed from titles
const EDITION_PHRASES: [&str; 5] = [
    "分冊版",
    "電子限定おまけ付き",
    "モノクロ版",
    "フルカラー版",
    "話売り",
];

/// Clean a title by removing extraneous metadata and normalizing spacing.
pub fn clean_title(title: &str) -> String {
    let mut cleaned = BRACKETED.replace_all(title, "").to_string();

    cleaned = cleaned.replace('～', " ").replace('：', " ");

    for phrase in EDITION_PHRASES {
        cleaned = cleaned.replace(phrase, "");
    }

    let cleaned = cleaned.trim_end_matches(['?', '!', ' ']).trim();
    MULTI_SPACE.replace_all(cleaned, " ").to_string()
}

/// Generate case variations of a title for better search coverage.
///
/// Returns the original first, then distinct case variants. Lowercase
/// titles longer than 4 characters additionally get a mid-word
/// capitalization variant ("motolog" -> "motoLog").
pub fn title_variations(title: &str) -> Vec<String> {
    let mut variations = vec![title.to_string()];

    fn push_unique(candidate: String, variations: &mut Vec<String>) {
        if !candidate.is_empty() && !variations.contains(&candidate) {
            variations.push(candidate);
        }
    }

    push_unique(title.to_lowercase(), &mut variations);
    push_unique(title.to_uppercase(), &mut variations);
    push_unique(capitalize(title), &mut variations);
    push_unique(title_case(title), &mut variations);

    let chars: Vec<char> = title.chars().collect();
    if chars.len() > 4 && title.chars().all(|c| !c.is_uppercase()) {
        let mid = chars.len() / 2;
        let mut mixed: String = chars[..mid].iter().collect();
        mixed.push_str(&capitalize(&chars[mid..].iter().collect::<String>()));
        push_unique(mixed, &mut variations);
    }

    variations
}

/// First character uppercased, rest lowercased
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Every whitespace-separated word capitalized
fn title_case(s: &str) -> String {
    s.split(' ')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}
