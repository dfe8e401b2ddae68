//! Structure extraction from noisy producer output
//!
//! Producers emit free text that may carry a JSON description directly,
//! inside a code fence, after a trigger phrase, or buried in prose. This
//! module recovers the object through layered parsing strategies, first
//! success wins:
//!
//! 1. Parse the entire text as JSON
//! 2. Fenced blocks tagged `json`
//! 3. Untagged fenced blocks
//! 4. Object spans following known trigger phrases (escape artifacts stripped)
//! 5. Brace-depth scan for the shortest balanced object with a discriminator key
//! 6. Simple non-nested `{...}` spans with the same discriminator check
//!
//! Finding nothing is a normal outcome for noisy output, not an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Keys that mark an object as a plausible description rather than an
/// incidental brace span
const DISCRIMINATOR_KEYS: [&str; 2] = ["index", "title"];

static TAGGED_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)```json\s*\n(.*?)\n```").expect("tagged fence regex"));

static UNTAGGED_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```\s*\n(.*?)\n```").expect("untagged fence regex"));

static TRIGGER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?si)CRITICAL:.*?(\{.*\})",
        r"(?si)JSON object.*?(\{.*\})",
        r"(?si)format.*?findings.*?(\{.*\})",
        r"(?si)structure.*?(\{.*\})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("trigger regex"))
    .collect()
});

static SIMPLE_BRACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{[^{}]*\}").expect("simple brace regex"));

/// Outcome of parsing one candidate span
enum ParseOutcome {
    /// Parsed to a JSON object
    Object(Map<String, Value>),
    /// Parsed, but to a non-object value (array, string, number)
    NonObject,
    /// Did not parse
    Failed,
}

fn try_parse(candidate: &str) -> ParseOutcome {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => ParseOutcome::Object(map),
        Ok(_) => ParseOutcome::NonObject,
        Err(_) => ParseOutcome::Failed,
    }
}

fn has_discriminator(map: &Map<String, Value>) -> bool {
    DISCRIMINATOR_KEYS.iter().any(|key| map.contains_key(*key))
}

/// Extract a structured description object from free text.
///
/// Returns `None` when no strategy recovers an object; callers drop the
/// candidate and move on. A text that parses wholesale to a non-object JSON
/// value (e.g. a bare array) also yields `None`: the producer answered with
/// the wrong shape, and scanning it for embedded objects would only surface
/// fragments of that answer.
pub fn extract_structure(text: &str) -> Option<Map<String, Value>> {
    // Strategy 1: the whole text is JSON
    match try_parse(text.trim()) {
        ParseOutcome::Object(map) => return Some(map),
        ParseOutcome::NonObject => {
            debug!("Full text parsed as non-object JSON; treating as no structure");
            return None;
        }
        ParseOutcome::Failed => {}
    }

    // Strategy 2: ```json fenced blocks
    for captures in TAGGED_FENCE.captures_iter(text) {
        match try_parse(captures[1].trim()) {
            ParseOutcome::Object(map) => return Some(map),
            ParseOutcome::NonObject => return None,
            ParseOutcome::Failed => continue,
        }
    }

    // Strategy 3: untagged fenced blocks
    for captures in UNTAGGED_FENCE.captures_iter(text) {
        match try_parse(captures[1].trim()) {
            ParseOutcome::Object(map) => return Some(map),
            ParseOutcome::NonObject => return None,
            ParseOutcome::Failed => continue,
        }
    }

    // Strategy 4: object spans after trigger phrases, with common escape
    // artifacts stripped before the first parse attempt
    for pattern in TRIGGER_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            let span = &captures[1];
            let cleaned = span.replace("\\\"", "\"").replace("\\!", "!");
            if let ParseOutcome::Object(map) = try_parse(&cleaned) {
                return Some(map);
            }
            if let ParseOutcome::Object(map) = try_parse(span) {
                return Some(map);
            }
        }
    }

    // Strategy 5: brace-depth scan — for each '{', take the shortest balanced
    // object starting there and accept the first that parses and carries a
    // discriminator key
    if let Some(map) = scan_balanced_objects(text) {
        return Some(map);
    }

    // Strategy 6: simple non-nested spans, same discriminator check
    for m in SIMPLE_BRACES.find_iter(text) {
        if let ParseOutcome::Object(map) = try_parse(m.as_str()) {
            if has_discriminator(&map) {
                return Some(map);
            }
        }
    }

    debug!(
        "Could not extract structure from text (first 200 chars): {:.200}",
        text
    );
    None
}

/// Scan every `{` position for the shortest balanced object starting there
fn scan_balanced_objects(text: &str) -> Option<Map<String, Value>> {
    let bytes = text.as_bytes();
    for start in 0..bytes.len() {
        if bytes[start] != b'{' {
            continue;
        }
        let mut depth = 0usize;
        for (offset, &byte) in bytes[start..].iter().enumerate() {
            match byte {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[start..start + offset + 1];
                        if let ParseOutcome::Object(map) = try_parse(candidate) {
                            if has_discriminator(&map) {
                                return Some(map);
                            }
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}
