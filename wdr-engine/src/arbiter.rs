//! Arbiter adapter: authoritative reconciliation fallback
//!
//! When the decision gate rejects the consensus path, all raw candidate
//! texts (failed attempts as explicit placeholders) go to a single
//! authoritative backend. The response must contain three ordered,
//! literally-labeled sections; the content after the last label is the
//! final description and must be a single JSON object with no surrounding
//! prose. The adapter never fabricates a record and never retries — retry
//! policy belongs to the caller.

use crate::types::{Arbiter, ArbitrationRequest, CandidateRecord, ProducerError};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Required section labels, in required order
pub const SIMILARITY_LABEL: &str = "Evaluate Similarity:";
pub const CONFIDENCE_LABEL: &str = "Confidence Score:";
pub const FINAL_LABEL: &str = "Final Description:";

/// Terminal arbitration failure
#[derive(Debug, Error)]
pub enum ArbitrationFailure {
    /// Response missing required sections or a parseable final object
    #[error("Arbitration parse failure: {0}")]
    Parse(String),

    /// Backend invocation failed
    #[error("Arbitration call failure: {0}")]
    Call(String),
}

/// Result of one arbitration pass
#[derive(Debug)]
pub struct ArbitrationOutcome {
    /// Validated final description (JSON text), present on success
    pub description: Option<String>,
    /// Raw backend response, present whenever the call returned text
    pub raw_output: Option<String>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// Terminal failure, if any
    pub failure: Option<ArbitrationFailure>,
}

/// Render candidate texts for the arbitration request.
///
/// Failed attempts are represented as explicit placeholders so the arbiter
/// sees how many attempts were made and why some produced nothing.
pub fn candidate_texts(attempts: &[CandidateRecord]) -> Vec<String> {
    attempts
        .iter()
        .map(|record| {
            if record.ok {
                record.raw_text.clone()
            } else {
                format!(
                    "[attempt {} failed: {}]",
                    record.attempt + 1,
                    record.error_detail.as_deref().unwrap_or("unknown error")
                )
            }
        })
        .collect()
}

/// Parse the three-section arbiter response.
///
/// All three labels must be present in order; the final description is the
/// trimmed text after the last label and must parse as a JSON object.
pub fn parse_response(text: &str) -> Result<String, ArbitrationFailure> {
    let similarity_pos = text
        .find(SIMILARITY_LABEL)
        .ok_or_else(|| ArbitrationFailure::Parse(missing(SIMILARITY_LABEL)))?;

    let after_similarity = similarity_pos + SIMILARITY_LABEL.len();
    let confidence_pos = text[after_similarity..]
        .find(CONFIDENCE_LABEL)
        .map(|p| after_similarity + p)
        .ok_or_else(|| ArbitrationFailure::Parse(missing(CONFIDENCE_LABEL)))?;

    let after_confidence = confidence_pos + CONFIDENCE_LABEL.len();
    let final_pos = text[after_confidence..]
        .find(FINAL_LABEL)
        .map(|p| after_confidence + p)
        .ok_or_else(|| ArbitrationFailure::Parse(missing(FINAL_LABEL)))?;

    let description = text[final_pos + FINAL_LABEL.len()..].trim();
    if description.is_empty() {
        return Err(ArbitrationFailure::Parse(
            "final description section is empty".to_string(),
        ));
    }

    match serde_json::from_str::<serde_json::Value>(description) {
        Ok(serde_json::Value::Object(_)) => Ok(description.to_string()),
        Ok(_) => Err(ArbitrationFailure::Parse(
            "final description is not a JSON object".to_string(),
        )),
        Err(e) => Err(ArbitrationFailure::Parse(format!(
            "final description is not valid JSON: {}",
            e
        ))),
    }
}

fn missing(label: &str) -> String {
    format!("response missing required section '{}' (in order)", label)
}

/// Invoke the arbiter once, under the shared timeout/cancellation guard.
pub async fn run_arbitration(
    arbiter: &dyn Arbiter,
    request: &ArbitrationRequest,
    call_timeout: Duration,
    cancel: &CancellationToken,
) -> ArbitrationOutcome {
    debug!(
        arbiter = %arbiter.id(),
        candidates = request.candidates.len(),
        "Starting arbitration"
    );

    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(ProducerError::Cancelled),
        result = tokio::time::timeout(call_timeout, arbiter.reconcile(request)) => {
            match result {
                Ok(inner) => inner,
                Err(_) => Err(ProducerError::Timeout(call_timeout.as_secs())),
            }
        }
    };

    match outcome {
        Ok(response) => match parse_response(&response.text) {
            Ok(description) => {
                debug!(arbiter = %arbiter.id(), "Arbitration produced a valid final description");
                ArbitrationOutcome {
                    description: Some(description),
                    raw_output: Some(response.text),
                    tokens_in: response.tokens_in,
                    tokens_out: response.tokens_out,
                    failure: None,
                }
            }
            Err(failure) => {
                warn!(arbiter = %arbiter.id(), error = %failure, "Arbitration response rejected");
                ArbitrationOutcome {
                    description: None,
                    raw_output: Some(response.text),
                    tokens_in: response.tokens_in,
                    tokens_out: response.tokens_out,
                    failure: Some(failure),
                }
            }
        },
        Err(error) => {
            warn!(arbiter = %arbiter.id(), error = %error, "Arbitration call failed");
            ArbitrationOutcome {
                description: None,
                raw_output: None,
                tokens_in: 0,
                tokens_out: 0,
                failure: Some(ArbitrationFailure::Call(error.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_response() -> String {
        [
            "Evaluate Similarity: descriptions 1 and 3 agree on the author and main cast.",
            "Confidence Score: 82",
            "Final Description:",
            "{\"title\": \"Monster\", \"authors\": [\"Naoki Urasawa\"]}",
        ]
        .join("\n")
    }

    #[test]
    fn test_parse_valid_response() {
        let description = parse_response(&valid_response()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&description).unwrap();
        assert_eq!(value["title"], "Monster");
    }

    #[test]
    fn test_missing_confidence_label_rejected() {
        let text = "Evaluate Similarity: close enough.\nFinal Description:\n{\"title\": \"Monster\"}";
        let err = parse_response(text).unwrap_err();
        assert!(err.to_string().contains(CONFIDENCE_LABEL));
    }

    #[test]
    fn test_labels_out_of_order_rejected() {
        let text = [
            "Confidence Score: 82",
            "Evaluate Similarity: close enough.",
            "Final Description:",
            "{\"title\": \"Monster\"}",
        ]
        .join("\n");
        assert!(parse_response(&text).is_err());
    }

    #[test]
    fn test_unparseable_final_description_rejected() {
        let text = [
            "Evaluate Similarity: close enough.",
            "Confidence Score: 82",
            "Final Description:",
            "The best description is the second one.",
        ]
        .join("\n");
        let err = parse_response(&text).unwrap_err();
        assert!(matches!(err, ArbitrationFailure::Parse(_)));
    }

    #[test]
    fn test_final_array_rejected() {
        let text = [
            "Evaluate Similarity: close enough.",
            "Confidence Score: 82",
            "Final Description:",
            "[\"Monster\"]",
        ]
        .join("\n");
        let err = parse_response(&text).unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
    }

    #[test]
    fn test_candidate_placeholders_for_failed_attempts() {
        let attempts = vec![
            CandidateRecord {
                attempt: 0,
                producer_id: "gen-a".to_string(),
                raw_text: "{\"title\": \"Monster\"}".to_string(),
                tokens_in: 5,
                tokens_out: 9,
                ok: true,
                error_detail: None,
            },
            CandidateRecord::failed(1, "gen-b", "connection refused".to_string()),
        ];
        let texts = candidate_texts(&attempts);
        assert_eq!(texts[0], "{\"title\": \"Monster\"}");
        assert_eq!(texts[1], "[attempt 2 failed: connection refused]");
    }
}
