//! Decision gate: consensus output vs arbiter fallback
//!
//! A pure, deterministic choice over the consensus report, the synthesized
//! consensus record, and the surviving record count. Every unmet condition
//! is recorded so the fallback is attributable in diagnostics.

use crate::config::MIN_RECORDS_FOR_CONSENSUS;
use crate::types::{ConsensusReport, DecisionPath, NormalizedRecord};
use tracing::{debug, warn};

/// Gate outcome with the reasons an arbiter fallback was taken
#[derive(Debug, Clone)]
pub struct Decision {
    pub path: DecisionPath,
    /// Unmet conditions; empty when the consensus path is chosen
    pub reasons: Vec<String>,
}

/// Choose the output path.
///
/// Consensus is selected iff all three conditions hold:
/// - at least [`MIN_RECORDS_FOR_CONSENSUS`] normalized records survived,
/// - confidence meets the threshold (inclusive at exact equality),
/// - the synthesized consensus record exists and is non-empty.
pub fn choose(
    report: &ConsensusReport,
    consensus_record: Option<&NormalizedRecord>,
    record_count: usize,
    threshold: f64,
) -> Decision {
    let mut reasons = Vec::new();

    if record_count < MIN_RECORDS_FOR_CONSENSUS {
        reasons.push(format!(
            "insufficient normalized records ({}/>={})",
            record_count, MIN_RECORDS_FOR_CONSENSUS
        ));
    }
    if report.confidence < threshold {
        reasons.push(format!(
            "low factual confidence ({:.1}%/>={:.1}%)",
            report.confidence, threshold
        ));
    }
    if consensus_record.map(|r| r.is_empty()).unwrap_or(true) {
        reasons.push("empty consensus record".to_string());
    }

    if reasons.is_empty() {
        debug!(
            confidence = report.confidence,
            record_count, "Decision: consensus"
        );
        Decision {
            path: DecisionPath::Consensus,
            reasons,
        }
    } else {
        warn!(
            confidence = report.confidence,
            record_count,
            reasons = %reasons.join("; "),
            "Decision: falling back to arbiter"
        );
        Decision {
            path: DecisionPath::Arbiter,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with_confidence(confidence: f64) -> ConsensusReport {
        ConsensusReport {
            confidence,
            ..Default::default()
        }
    }

    fn non_empty_record() -> NormalizedRecord {
        NormalizedRecord {
            title: Some("Monster".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_all_conditions_met_selects_consensus() {
        let report = report_with_confidence(80.0);
        let record = non_empty_record();
        let decision = choose(&report, Some(&record), 3, 56.0);
        assert_eq!(decision.path, DecisionPath::Consensus);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn test_confidence_exactly_at_threshold_selects_consensus() {
        let report = report_with_confidence(56.0);
        let record = non_empty_record();
        let decision = choose(&report, Some(&record), 2, 56.0);
        assert_eq!(decision.path, DecisionPath::Consensus);
    }

    #[test]
    fn test_single_record_forces_arbiter_regardless_of_confidence() {
        let report = report_with_confidence(100.0);
        let record = non_empty_record();
        let decision = choose(&report, Some(&record), 1, 56.0);
        assert_eq!(decision.path, DecisionPath::Arbiter);
        assert!(decision.reasons[0].contains("insufficient normalized records"));
    }

    #[test]
    fn test_low_confidence_forces_arbiter() {
        let report = report_with_confidence(40.0);
        let record = non_empty_record();
        let decision = choose(&report, Some(&record), 4, 56.0);
        assert_eq!(decision.path, DecisionPath::Arbiter);
        assert!(decision.reasons[0].contains("low factual confidence"));
    }

    #[test]
    fn test_missing_consensus_record_forces_arbiter() {
        let report = report_with_confidence(90.0);
        let decision = choose(&report, None, 3, 56.0);
        assert_eq!(decision.path, DecisionPath::Arbiter);
        assert_eq!(decision.reasons, vec!["empty consensus record"]);
    }

    #[test]
    fn test_all_unmet_conditions_are_recorded() {
        let report = report_with_confidence(0.0);
        let decision = choose(&report, None, 0, 56.0);
        assert_eq!(decision.path, DecisionPath::Arbiter);
        assert_eq!(decision.reasons.len(), 3);
    }
}
