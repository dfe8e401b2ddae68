//! Normalization of extracted objects into the canonical record shape
//!
//! Producers disagree on field names (`title` vs `Title`), shapes (scalar vs
//! list, string vs `{name: ...}` object), and nesting (`publication` vs
//! `Original Work`). An explicit alias table maps each canonical field to an
//! ordered list of accepted source keys; the first present, non-empty key
//! wins. Unknown fields are ignored — the schema is intentionally lossy
//! toward the canonical shape.
//!
//! Normalization never fails loudly: a hopeless input yields `None` and the
//! candidate is dropped, counted for reporting.

use crate::types::{NormalizedRecord, PublicationInfo};
use serde_json::{Map, Value};
use tracing::debug;

const ID_KEYS: [&str; 3] = ["index", "Index", "ID"];
const TITLE_KEYS: [&str; 2] = ["title", "Title"];
const ALT_TITLE_KEYS: [&str; 3] = ["alternative_titles", "Alternative Titles", "AlternativeTitles"];
const TYPE_KEYS: [&str; 2] = ["type", "Type"];
const AUTHOR_KEYS: [&str; 2] = ["authors", "Authors"];
const ARTIST_KEYS: [&str; 3] = ["artists", "Artists", "Artist"];
const GENRE_KEYS: [&str; 3] = ["genres", "Genres", "Genre"];
const SYNOPSIS_KEYS: [&str; 3] = ["synopsis", "Synopsis", "plot"];
const CHARACTER_KEYS: [&str; 3] = ["main_characters", "Main Characters", "characters"];
const PUBLICATION_KEYS: [&str; 4] = ["Publication", "publication", "publication_info", "Original Work"];
const STATUS_KEYS: [&str; 2] = ["status", "Status"];

const PUBLISHER_KEYS: [&str; 2] = ["publisher", "Publisher"];
const PUB_STATUS_KEYS: [&str; 2] = ["status", "Status"];
const START_DATE_KEYS: [&str; 3] = ["start_date", "Start Date", "startDate"];
const END_DATE_KEYS: [&str; 3] = ["end_date", "End Date", "endDate"];

/// Normalize an extracted object into the canonical record shape.
///
/// Returns `None` when nothing usable survives (every canonical field
/// empty); such a record would only inflate the quorum count.
pub fn normalize_record(desc: &Map<String, Value>) -> Option<NormalizedRecord> {
    let publication = lookup(desc, &PUBLICATION_KEYS)
        .and_then(Value::as_object)
        .map(normalize_publication)
        .unwrap_or_default();

    let status = lookup(desc, &STATUS_KEYS)
        .and_then(scalar_string)
        .or_else(|| publication.status.clone());

    let record = NormalizedRecord {
        id: lookup(desc, &ID_KEYS).and_then(scalar_string),
        title: lookup(desc, &TITLE_KEYS).and_then(scalar_string),
        alternative_titles: lookup(desc, &ALT_TITLE_KEYS).map(string_list).unwrap_or_default(),
        work_type: lookup(desc, &TYPE_KEYS).and_then(scalar_string),
        authors: lookup(desc, &AUTHOR_KEYS).map(person_list).unwrap_or_default(),
        artists: lookup(desc, &ARTIST_KEYS).map(person_list).unwrap_or_default(),
        genres: lookup(desc, &GENRE_KEYS).map(string_list).unwrap_or_default(),
        synopsis: lookup(desc, &SYNOPSIS_KEYS).and_then(scalar_string),
        characters: lookup(desc, &CHARACTER_KEYS).map(person_list).unwrap_or_default(),
        publication,
        status,
    };

    if record.is_empty() {
        debug!("Normalization produced an empty record; dropping candidate");
        return None;
    }
    Some(record)
}

/// First present, non-empty value among the accepted keys
fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| is_present(value))
}

/// Presence check: null, empty strings, and empty containers count as absent
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Scalar value as a string (numbers are stringified, e.g. numeric indexes)
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A field where a list is canonical: bare scalars wrap into one-element
/// lists, non-string entries without a usable rendering are dropped
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        _ => scalar_string(value).map(|s| vec![s]).unwrap_or_default(),
    }
}

/// Person-like entries: plain strings or objects with a `name` key, both
/// normalized to trimmed strings. Entries with no usable name are dropped.
fn person_list(value: &Value) -> Vec<String> {
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(obj) => obj
                .get("name")
                .and_then(Value::as_str)
                .map(|name| name.trim().to_string()),
            _ => None,
        })
        .filter(|name| !name.is_empty())
        .collect()
}

fn normalize_publication(info: &Map<String, Value>) -> PublicationInfo {
    PublicationInfo {
        publisher: lookup(info, &PUBLISHER_KEYS).and_then(scalar_string),
        status: lookup(info, &PUB_STATUS_KEYS).and_then(scalar_string),
        start_date: lookup(info, &START_DATE_KEYS).and_then(scalar_string),
        end_date: lookup(info, &END_DATE_KEYS).and_then(scalar_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_lowercase_and_capitalized_aliases() {
        let lower = as_map(json!({"title": "Monster", "authors": ["Naoki Urasawa"]}));
        let upper = as_map(json!({"Title": "Monster", "Authors": ["Naoki Urasawa"]}));

        let a = normalize_record(&lower).unwrap();
        let b = normalize_record(&upper).unwrap();
        assert_eq!(a.title, b.title);
        assert_eq!(a.authors, b.authors);
    }

    #[test]
    fn test_scalar_wraps_into_list() {
        let desc = as_map(json!({"title": "Monster", "Genre": "Thriller"}));
        let record = normalize_record(&desc).unwrap();
        assert_eq!(record.genres, vec!["Thriller"]);
    }

    #[test]
    fn test_person_objects_normalize_to_names() {
        let desc = as_map(json!({
            "title": "Monster",
            "authors": [
                "Naoki Urasawa",
                {"name": "  Takashi Nagasaki "},
                {"role": "editor"},
                42
            ]
        }));
        let record = normalize_record(&desc).unwrap();
        assert_eq!(record.authors, vec!["Naoki Urasawa", "Takashi Nagasaki"]);
    }

    #[test]
    fn test_characters_accept_all_alias_keys() {
        for key in ["main_characters", "Main Characters", "characters"] {
            let desc = as_map(json!({"title": "Monster", key: ["Kenzo Tenma"]}));
            let record = normalize_record(&desc).unwrap();
            assert_eq!(record.characters, vec!["Kenzo Tenma"], "key: {}", key);
        }
    }

    #[test]
    fn test_publication_variants_and_status_fallback() {
        let desc = as_map(json!({
            "title": "Monster",
            "Original Work": {
                "Publisher": "Shogakukan",
                "Status": "Completed",
                "Start Date": "1994",
                "endDate": "2001"
            }
        }));
        let record = normalize_record(&desc).unwrap();
        assert_eq!(record.publication.publisher.as_deref(), Some("Shogakukan"));
        assert_eq!(record.publication.start_date.as_deref(), Some("1994"));
        assert_eq!(record.publication.end_date.as_deref(), Some("2001"));
        // No top-level status: falls back to the nested publication status
        assert_eq!(record.status.as_deref(), Some("Completed"));
    }

    #[test]
    fn test_top_level_status_wins_over_publication() {
        let desc = as_map(json!({
            "title": "Monster",
            "status": "Ongoing",
            "publication": {"status": "Completed"}
        }));
        let record = normalize_record(&desc).unwrap();
        assert_eq!(record.status.as_deref(), Some("Ongoing"));
    }

    #[test]
    fn test_empty_strings_fall_through_aliases() {
        let desc = as_map(json!({"title": "", "Title": "Monster"}));
        let record = normalize_record(&desc).unwrap();
        assert_eq!(record.title.as_deref(), Some("Monster"));
    }

    #[test]
    fn test_numeric_index_is_stringified() {
        let desc = as_map(json!({"index": 1023, "title": "Monster"}));
        let record = normalize_record(&desc).unwrap();
        assert_eq!(record.id.as_deref(), Some("1023"));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let desc = as_map(json!({"title": "Monster", "rating": 9.2, "reviews": ["great"]}));
        let record = normalize_record(&desc).unwrap();
        assert_eq!(record.title.as_deref(), Some("Monster"));
        assert!(record.genres.is_empty());
    }

    #[test]
    fn test_nothing_usable_drops_record() {
        let desc = as_map(json!({"rating": 9.2, "votes": 120}));
        assert!(normalize_record(&desc).is_none());
    }
}
