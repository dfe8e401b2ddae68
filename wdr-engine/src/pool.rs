//! Generator pool: parallel fan-out of generation attempts
//!
//! Issues K generation calls against M producers, assigning producers
//! cyclically so every attempt has one even when M < K. Attempts run
//! concurrently; each resolves to a [`CandidateRecord`] at its own index,
//! so there is no shared mutable state between them. A failing attempt is
//! captured in its record and never aborts or delays the others.

use crate::error::{EngineError, EngineResult};
use crate::types::{CandidateRecord, GenerationRequest, Producer, ProducerError};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cyclic producer assignment: attempt `i` runs on `producers[i % M]`.
///
/// Standalone so the scheduling rule is testable in isolation.
pub fn assigned_producer(attempt: usize, producer_count: usize) -> usize {
    attempt % producer_count
}

/// Run `attempt_count` generation attempts in parallel.
///
/// Every producer invocation is wrapped in `call_timeout` and observes the
/// cancellation token; a timed-out, cancelled, or failed attempt becomes a
/// `CandidateRecord` with `ok = false` and an attributable diagnostic.
///
/// Returns the records ordered by attempt index. Zero configured producers
/// is a fatal configuration error; no attempt is made.
pub async fn run_attempts(
    producers: &[Arc<dyn Producer>],
    request: &GenerationRequest,
    attempt_count: usize,
    call_timeout: Duration,
    cancel: &CancellationToken,
) -> EngineResult<Vec<CandidateRecord>> {
    if producers.is_empty() {
        return Err(EngineError::Configuration(
            "No generator producers configured".to_string(),
        ));
    }

    debug!(
        attempts = attempt_count,
        producers = producers.len(),
        "Starting generation fan-out"
    );

    let attempts = (0..attempt_count).map(|attempt| {
        let producer = Arc::clone(&producers[assigned_producer(attempt, producers.len())]);
        let cancel = cancel.clone();
        async move {
            run_single_attempt(attempt, producer, request, call_timeout, &cancel).await
        }
    });

    // join_all preserves input order, so record N lands at index N
    let records = join_all(attempts).await;

    let succeeded = records.iter().filter(|r| r.ok).count();
    debug!(
        succeeded,
        failed = records.len() - succeeded,
        "Generation fan-out complete"
    );

    Ok(records)
}

async fn run_single_attempt(
    attempt: usize,
    producer: Arc<dyn Producer>,
    request: &GenerationRequest,
    call_timeout: Duration,
    cancel: &CancellationToken,
) -> CandidateRecord {
    let producer_id = producer.id().to_string();
    debug!(attempt, producer = %producer_id, "Generation attempt started");

    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(ProducerError::Cancelled),
        result = tokio::time::timeout(call_timeout, producer.generate(request)) => {
            match result {
                Ok(inner) => inner,
                Err(_) => Err(ProducerError::Timeout(call_timeout.as_secs())),
            }
        }
    };

    match outcome {
        Ok(response) => {
            debug!(
                attempt,
                producer = %producer_id,
                tokens_in = response.tokens_in,
                tokens_out = response.tokens_out,
                "Generation attempt succeeded"
            );
            CandidateRecord {
                attempt,
                producer_id,
                raw_text: response.text,
                tokens_in: response.tokens_in,
                tokens_out: response.tokens_out,
                ok: true,
                error_detail: None,
            }
        }
        Err(error) => {
            warn!(attempt, producer = %producer_id, error = %error, "Generation attempt failed");
            CandidateRecord::failed(attempt, &producer_id, error.to_string())
        }
    }
}
