//! Workflow orchestrator
//!
//! Runs one end-to-end reconciliation for a single work:
//!
//! 1. Generation fan-out (parallel producer attempts)
//! 2. Extraction + normalization per candidate
//! 3. Consensus resolution and record synthesis
//! 4. Decision gate
//! 5. Consensus assembly, or arbitration fallback
//!
//! Stages 2-4 are pure, synchronous transformations over already-fetched
//! data; the producer and arbiter calls are the only suspension points.
//! Per-candidate failures are folded into diagnostics and never abort the
//! workflow. Progress events stream through an optional channel; emission
//! is best-effort and never blocks on a full channel.

use crate::arbiter::{self, ArbitrationFailure};
use crate::config::EngineConfig;
use crate::consensus;
use crate::decision;
use crate::error::{EngineError, EngineResult};
use crate::extract::extract_structure;
use crate::normalize::normalize_record;
use crate::pool;
use crate::title;
use crate::types::{
    Arbiter, ArbitrationRequest, CandidateRecord, DecisionPath, FinalRecord, GenerationRequest,
    NormalizedRecord, Producer, WorkflowEvent, WorkflowStatus,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One work to reconcile
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    /// Canonical work title
    pub title: String,
    /// Internal tracking index
    pub index: String,
    /// Known author names, possibly empty
    pub known_authors: Vec<String>,
}

/// Reconciliation workflow runner.
///
/// Owns the configured producers and arbiter for the lifetime of the
/// workflow; each `reconcile` call is independent and shares no mutable
/// state with other calls.
pub struct Reconciler {
    config: EngineConfig,
    producers: Vec<Arc<dyn Producer>>,
    arbiter: Arc<dyn Arbiter>,
    event_tx: Option<mpsc::Sender<WorkflowEvent>>,
}

impl Reconciler {
    /// Create a reconciler.
    ///
    /// Zero producers is a fatal configuration error, raised here before
    /// any workflow runs.
    pub fn new(
        config: EngineConfig,
        producers: Vec<Arc<dyn Producer>>,
        arbiter: Arc<dyn Arbiter>,
    ) -> EngineResult<Self> {
        if producers.is_empty() {
            return Err(EngineError::Configuration(
                "No generator producers configured".to_string(),
            ));
        }
        if config.attempt_count == 0 {
            return Err(EngineError::Configuration(
                "Attempt count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            config,
            producers,
            arbiter,
            event_tx: None,
        })
    }

    /// Create a reconciler with an event channel for progress reporting
    pub fn with_events(
        config: EngineConfig,
        producers: Vec<Arc<dyn Producer>>,
        arbiter: Arc<dyn Arbiter>,
        event_tx: mpsc::Sender<WorkflowEvent>,
    ) -> EngineResult<Self> {
        let mut reconciler = Self::new(config, producers, arbiter)?;
        reconciler.event_tx = Some(event_tx);
        Ok(reconciler)
    }

    /// Run one reconciliation workflow.
    ///
    /// Cancellation between stages returns a `Cancelled` record without
    /// invoking further backends; already-collected attempts and token
    /// counts are preserved.
    pub async fn reconcile(
        &self,
        request: &WorkflowRequest,
        cancel: &CancellationToken,
    ) -> EngineResult<FinalRecord> {
        let workflow_id = Uuid::new_v4();
        info!(
            workflow_id = %workflow_id,
            title = %request.title,
            index = %request.index,
            "Starting reconciliation workflow"
        );
        self.emit(WorkflowEvent::WorkflowStarted {
            workflow_id,
            title: request.title.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        });

        if cancel.is_cancelled() {
            return Ok(self.cancelled_record(
                workflow_id,
                Vec::new(),
                "workflow cancelled before generation".to_string(),
            ));
        }

        // Stage 1: generation fan-out
        let generation_request = GenerationRequest {
            title: request.title.clone(),
            cleaned_title: title::clean_title(&request.title),
            title_variations: title::title_variations(&request.title),
            index: request.index.clone(),
            known_authors: request.known_authors.clone(),
        };

        let attempts = pool::run_attempts(
            &self.producers,
            &generation_request,
            self.config.attempt_count,
            self.config.call_timeout,
            cancel,
        )
        .await?;

        for record in &attempts {
            self.emit(WorkflowEvent::AttemptCompleted {
                attempt: record.attempt,
                producer_id: record.producer_id.clone(),
                ok: record.ok,
            });
        }

        if cancel.is_cancelled() {
            return Ok(self.cancelled_record(
                workflow_id,
                attempts,
                "workflow cancelled after generation".to_string(),
            ));
        }

        // Stage 2: extraction + normalization, per candidate, failures dropped
        let mut diagnostics = Vec::new();
        let mut normalized = Vec::new();
        for record in attempts.iter().filter(|r| r.ok) {
            let extracted = extract_structure(&record.raw_text);
            let outcome = extracted.as_ref().and_then(normalize_record);
            self.emit(WorkflowEvent::CandidateExtracted {
                attempt: record.attempt,
                ok: outcome.is_some(),
            });
            match outcome {
                Some(normalized_record) => normalized.push(normalized_record),
                None if extracted.is_none() => {
                    debug!(attempt = record.attempt, "No structure found in candidate");
                    diagnostics.push(format!(
                        "attempt {}: no parseable structure in producer output",
                        record.attempt + 1
                    ));
                }
                None => {
                    debug!(attempt = record.attempt, "Candidate normalized to nothing");
                    diagnostics.push(format!(
                        "attempt {}: extracted object lacked usable fields",
                        record.attempt + 1
                    ));
                }
            }
        }
        for record in attempts.iter().filter(|r| !r.ok) {
            diagnostics.push(format!(
                "attempt {}: generation failed: {}",
                record.attempt + 1,
                record.error_detail.as_deref().unwrap_or("unknown error")
            ));
        }

        info!(
            workflow_id = %workflow_id,
            normalized = normalized.len(),
            attempts = attempts.len(),
            "Normalized {} of {} attempts",
            normalized.len(),
            attempts.len()
        );

        // Stage 3: consensus resolution and record synthesis
        let report = consensus::resolve(&normalized);
        self.emit(WorkflowEvent::ConsensusComputed {
            record_count: normalized.len(),
            consensus_items: report.consensus_items,
            candidate_items: report.candidate_items,
            confidence: report.confidence,
        });

        let consensus_record = consensus::synthesize(&normalized, &report, &request.title);

        // Stage 4: decision gate
        let decision = decision::choose(
            &report,
            consensus_record.as_ref(),
            normalized.len(),
            self.config.confidence_threshold,
        );
        self.emit(WorkflowEvent::DecisionMade {
            path: decision.path,
            reasons: decision.reasons.clone(),
        });
        diagnostics.extend(decision.reasons.clone());

        // Stage 5: assemble the chosen path
        let record = match decision.path {
            DecisionPath::Consensus => self.assemble_consensus(
                attempts,
                consensus_record.expect("gate verified the consensus record exists"),
                &report,
                normalized.len(),
                diagnostics,
            )?,
            DecisionPath::Arbiter => {
                if cancel.is_cancelled() {
                    return Ok(self.cancelled_record(
                        workflow_id,
                        attempts,
                        "workflow cancelled before arbitration".to_string(),
                    ));
                }
                self.assemble_arbitration(
                    &request.title,
                    &request.index,
                    attempts,
                    diagnostics,
                    cancel,
                )
                .await
            }
        };

        info!(
            workflow_id = %workflow_id,
            status = record.status.as_str(),
            decision = record.decision.as_str(),
            tokens_in = record.tokens_in,
            tokens_out = record.tokens_out,
            "Workflow completed"
        );
        self.emit(WorkflowEvent::WorkflowCompleted {
            workflow_id,
            status: record.status,
            timestamp: chrono::Utc::now().timestamp(),
        });

        Ok(record)
    }

    /// Assemble the final record from the consensus path
    fn assemble_consensus(
        &self,
        attempts: Vec<CandidateRecord>,
        consensus_record: NormalizedRecord,
        report: &crate::types::ConsensusReport,
        record_count: usize,
        diagnostics: Vec<String>,
    ) -> EngineResult<FinalRecord> {
        let description = serde_json::to_string_pretty(&consensus_record).map_err(|e| {
            EngineError::Common(wdr_common::Error::Internal(format!(
                "Serialize consensus failed: {}",
                e
            )))
        })?;

        let summary = format!(
            "Used consensus from {} normalized records with {:.1}% factual confidence.\n\n\
             Consensus characters: {}\nConsensus authors: {}",
            record_count,
            report.confidence,
            join_or_none(&report.characters),
            join_or_none(&report.authors),
        );

        let (tokens_in, tokens_out) = sum_tokens(&attempts);
        Ok(FinalRecord {
            status: WorkflowStatus::Success,
            description: Some(description),
            attempts,
            tokens_in,
            tokens_out,
            decision: DecisionPath::Consensus,
            arbiter_id: self.arbiter.id().to_string(),
            arbiter_output: Some(summary),
            diagnostics,
        })
    }

    /// Run arbitration and assemble the final record from its outcome
    async fn assemble_arbitration(
        &self,
        title: &str,
        index: &str,
        attempts: Vec<CandidateRecord>,
        mut diagnostics: Vec<String>,
        cancel: &CancellationToken,
    ) -> FinalRecord {
        let arbitration_request = ArbitrationRequest {
            title: title.to_string(),
            index: index.to_string(),
            candidates: arbiter::candidate_texts(&attempts),
        };

        let outcome = arbiter::run_arbitration(
            self.arbiter.as_ref(),
            &arbitration_request,
            self.config.call_timeout,
            cancel,
        )
        .await;

        self.emit(WorkflowEvent::ArbitrationCompleted {
            ok: outcome.failure.is_none(),
        });

        let status = match &outcome.failure {
            None => WorkflowStatus::Success,
            Some(ArbitrationFailure::Parse(detail)) => {
                diagnostics.push(format!("arbitration parse failure: {}", detail));
                WorkflowStatus::FailedArbitration
            }
            Some(ArbitrationFailure::Call(detail)) => {
                diagnostics.push(format!("arbitration call failure: {}", detail));
                WorkflowStatus::FailedArbitrationException
            }
        };

        let (mut tokens_in, mut tokens_out) = sum_tokens(&attempts);
        tokens_in += outcome.tokens_in;
        tokens_out += outcome.tokens_out;

        FinalRecord {
            status,
            description: outcome.description,
            attempts,
            tokens_in,
            tokens_out,
            decision: DecisionPath::Arbiter,
            arbiter_id: self.arbiter.id().to_string(),
            arbiter_output: outcome.raw_output,
            diagnostics,
        }
    }

    /// Terminal record for a cancelled workflow.
    ///
    /// The decision path reports ARBITER (the fallback that would have run);
    /// the diagnostic records how far the workflow got.
    fn cancelled_record(
        &self,
        workflow_id: Uuid,
        attempts: Vec<CandidateRecord>,
        diagnostic: String,
    ) -> FinalRecord {
        warn!(workflow_id = %workflow_id, "{}", diagnostic);
        self.emit(WorkflowEvent::WorkflowCompleted {
            workflow_id,
            status: WorkflowStatus::Cancelled,
            timestamp: chrono::Utc::now().timestamp(),
        });
        let (tokens_in, tokens_out) = sum_tokens(&attempts);
        FinalRecord {
            status: WorkflowStatus::Cancelled,
            description: None,
            attempts,
            tokens_in,
            tokens_out,
            decision: DecisionPath::Arbiter,
            arbiter_id: self.arbiter.id().to_string(),
            arbiter_output: None,
            diagnostics: vec![diagnostic],
        }
    }

    /// Emit a workflow event if a channel is configured (best-effort)
    fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }
}

fn sum_tokens(attempts: &[CandidateRecord]) -> (u64, u64) {
    attempts
        .iter()
        .fold((0, 0), |(i, o), r| (i + r.tokens_in, o + r.tokens_out))
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "None".to_string()
    } else {
        values.join(", ")
    }
}
