//! Consensus resolution over normalized records
//!
//! Field-level agreement statistics across all surviving normalized records:
//! multi-valued fields (characters, authors) use a fixed quorum — a value is
//! consensus iff it appears in at least [`QUORUM`] distinct records,
//! regardless of how many records exist. Status takes the plurality value,
//! ties broken by first-seen order.
//!
//! The confidence formula rewards both the ratio of agreement and the
//! absolute number of agreed facts, so one confidently-repeated fact
//! outweighs many singleton disagreements:
//!
//! ```text
//! confidence = min(100, (consensus_items / candidate_items) * 100 + consensus_items * 10)
//! ```
//!
//! Everything here is a pure, synchronous transformation: no I/O, no
//! failure modes. With fewer than two records the report is empty with
//! confidence zero.

use crate::types::{ConsensusReport, FieldConflict, NormalizedRecord};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Minimum number of distinct records that must agree on a value for it to
/// be treated as consensus. Fixed, independent of the attempt count.
pub const QUORUM: usize = 2;

/// Occurrence counter that preserves first-seen ordering
struct OrderedCounter {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl OrderedCounter {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            counts: HashMap::new(),
        }
    }

    fn add(&mut self, value: &str) {
        let entry = self.counts.entry(value.to_string()).or_insert(0);
        if *entry == 0 {
            self.order.push(value.to_string());
        }
        *entry += 1;
    }

    /// Values with count >= quorum, in first-seen order
    fn at_least(&self, quorum: usize) -> Vec<String> {
        self.order
            .iter()
            .filter(|v| self.counts[*v] >= quorum)
            .cloned()
            .collect()
    }

    fn distinct(&self) -> usize {
        self.order.len()
    }

    /// Plurality value; ties broken by first-seen order
    fn plurality(&self) -> Option<&str> {
        self.order
            .iter()
            .max_by_key(|v| {
                // Stable max: on equal counts, the earlier first-seen value
                // must win, so later entries need a strictly greater count.
                (self.counts[v.as_str()], std::cmp::Reverse(self.position(v.as_str())))
            })
            .map(String::as_str)
    }

    fn position(&self, value: &str) -> usize {
        self.order.iter().position(|v| v == value).unwrap_or(usize::MAX)
    }
}

/// Count one multi-valued field across records.
///
/// Values are trimmed and deduplicated within each record first, so a value
/// repeated inside a single record cannot reach quorum on its own.
fn count_field<F>(records: &[NormalizedRecord], accessor: F) -> OrderedCounter
where
    F: Fn(&NormalizedRecord) -> &[String],
{
    let mut counter = OrderedCounter::new();
    for record in records {
        let mut seen = HashSet::new();
        for value in accessor(record) {
            let trimmed = value.trim();
            if !trimmed.is_empty() && seen.insert(trimmed) {
                counter.add(trimmed);
            }
        }
    }
    counter
}

/// Resolve per-field agreement across all normalized records.
pub fn resolve(records: &[NormalizedRecord]) -> ConsensusReport {
    if records.len() < QUORUM {
        return ConsensusReport::default();
    }

    let character_counts = count_field(records, |r| &r.characters);
    let author_counts = count_field(records, |r| &r.authors);

    let mut status_counts = OrderedCounter::new();
    for record in records {
        if let Some(status) = record.status.as_deref() {
            let trimmed = status.trim();
            if !trimmed.is_empty() {
                status_counts.add(trimmed);
            }
        }
    }

    let characters = character_counts.at_least(QUORUM);
    let authors = author_counts.at_least(QUORUM);
    let status = status_counts.plurality().map(str::to_string);

    let consensus_items = characters.len() + authors.len() + usize::from(status.is_some());
    let candidate_items = character_counts.distinct()
        + author_counts.distinct()
        + usize::from(status_counts.distinct() > 0);

    let confidence = if candidate_items > 0 {
        let ratio = consensus_items as f64 / candidate_items as f64;
        (ratio * 100.0 + consensus_items as f64 * 10.0).min(100.0)
    } else {
        0.0
    };

    // Status values that lost the plurality vote, kept for diagnostics
    let conflicts = match status.as_deref() {
        Some(winner) if status_counts.distinct() > 1 => status_counts
            .order
            .iter()
            .filter(|v| v.as_str() != winner)
            .map(|loser| FieldConflict {
                field: "status".to_string(),
                accepted: winner.to_string(),
                rejected: loser.clone(),
                similarity: strsim::normalized_levenshtein(winner, loser),
            })
            .collect(),
        _ => Vec::new(),
    };

    debug!(
        records = records.len(),
        consensus_items,
        candidate_items,
        confidence,
        "Consensus resolution complete"
    );

    ConsensusReport {
        characters,
        authors,
        status,
        confidence,
        consensus_items,
        candidate_items,
        conflicts,
    }
}

/// Synthesize the consensus record: copy the most information-rich record as
/// base, overwrite multi-valued fields with consensus values where present,
/// and force the title to the canonical input title.
pub fn synthesize(
    records: &[NormalizedRecord],
    report: &ConsensusReport,
    canonical_title: &str,
) -> Option<NormalizedRecord> {
    // Richest record = longest serialized representation; ties keep the
    // earliest record
    let mut base: Option<(&NormalizedRecord, usize)> = None;
    for record in records {
        let len = serde_json::to_string(record).map(|s| s.len()).unwrap_or(0);
        if base.map(|(_, best)| len > best).unwrap_or(true) {
            base = Some((record, len));
        }
    }
    let (base, _) = base?;

    let mut consensus = base.clone();
    if !report.characters.is_empty() {
        consensus.characters = report.characters.clone();
    }
    if !report.authors.is_empty() {
        consensus.authors = report.authors.clone();
    }
    if report.status.is_some() {
        consensus.status = report.status.clone();
    }
    consensus.title = Some(canonical_title.to_string());

    Some(consensus)
}
