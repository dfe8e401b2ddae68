//! Core types and trait definitions for the reconciliation engine
//!
//! Defines the data model flowing through the pipeline:
//! - `CandidateRecord`: one raw generation attempt
//! - `NormalizedRecord`: canonical record shape after extraction/normalization
//! - `ConsensusReport`: per-field agreement statistics with confidence score
//! - `FinalRecord`: the chosen output with status and token ledger
//!
//! plus the `Producer`/`Arbiter` capability traits implemented by backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Candidate generation
// ============================================================================

/// One raw generation attempt, before any parsing.
///
/// Produced once per attempt by the generator pool; immutable afterwards.
/// Ordered by attempt index for reporting; the order carries no semantic
/// weight downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Attempt index (0-based)
    pub attempt: usize,
    /// Identifier of the producer assigned to this attempt
    pub producer_id: String,
    /// Raw text returned by the producer (empty on failure)
    pub raw_text: String,
    /// Prompt tokens consumed by this attempt
    pub tokens_in: u64,
    /// Completion tokens produced by this attempt
    pub tokens_out: u64,
    /// Whether the producer call succeeded
    pub ok: bool,
    /// Failure detail when `ok` is false
    pub error_detail: Option<String>,
}

impl CandidateRecord {
    /// Build a failed attempt record with an attributable diagnostic
    pub fn failed(attempt: usize, producer_id: &str, detail: String) -> Self {
        Self {
            attempt,
            producer_id: producer_id.to_string(),
            raw_text: String::new(),
            tokens_in: 0,
            tokens_out: 0,
            ok: false,
            error_detail: Some(detail),
        }
    }
}

// ============================================================================
// Canonical record shape
// ============================================================================

/// Nested publication details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl PublicationInfo {
    pub fn is_empty(&self) -> bool {
        self.publisher.is_none()
            && self.status.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }
}

/// Canonical record shape shared by every candidate after normalization.
///
/// Any scalar may be absent; list fields are never null, only empty. The
/// serialized key names match the upstream description schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Internal tracking index
    #[serde(rename = "index", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub alternative_titles: Vec<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub work_type: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synopsis: Option<String>,
    #[serde(rename = "main_characters", default)]
    pub characters: Vec<String>,
    #[serde(rename = "publication_info", default)]
    pub publication: PublicationInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl NormalizedRecord {
    /// True when no field carries any content
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.title.is_none()
            && self.alternative_titles.is_empty()
            && self.work_type.is_none()
            && self.authors.is_empty()
            && self.artists.is_empty()
            && self.genres.is_empty()
            && self.synopsis.is_none()
            && self.characters.is_empty()
            && self.publication.is_empty()
            && self.status.is_none()
    }
}

// ============================================================================
// Consensus
// ============================================================================

/// Disagreement between two field values, kept for diagnostics only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    /// Field the disagreement occurred on
    pub field: String,
    /// Value that won the plurality/quorum
    pub accepted: String,
    /// Value that lost
    pub rejected: String,
    /// Normalized Levenshtein similarity between the two values (0.0-1.0)
    pub similarity: f64,
}

/// Per-field agreement statistics over the normalized records.
///
/// Read-only once produced; computed in a single resolution pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusReport {
    /// Characters appearing in at least `QUORUM` distinct records (first-seen order)
    pub characters: Vec<String>,
    /// Authors appearing in at least `QUORUM` distinct records (first-seen order)
    pub authors: Vec<String>,
    /// Plurality status value, if any record carried a status
    pub status: Option<String>,
    /// Confidence score in percent (0.0-100.0)
    pub confidence: f64,
    /// Number of quorum-agreed items (characters + authors + status)
    pub consensus_items: usize,
    /// Number of distinct candidate items (characters + authors + status)
    pub candidate_items: usize,
    /// Disagreements observed during resolution
    pub conflicts: Vec<FieldConflict>,
}

// ============================================================================
// Decision and final output
// ============================================================================

/// Which path produced the final record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionPath {
    /// Automatically assembled consensus record
    Consensus,
    /// Authoritative arbiter reconciliation
    Arbiter,
}

impl DecisionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionPath::Consensus => "CONSENSUS",
            DecisionPath::Arbiter => "ARBITER",
        }
    }
}

/// Terminal workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// A JSON-parseable final description exists
    Success,
    /// Arbiter response missing required sections or final JSON
    FailedArbitration,
    /// Arbiter backend invocation failed
    FailedArbitrationException,
    /// Workflow cancelled before completion
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Success => "SUCCESS",
            WorkflowStatus::FailedArbitration => "FAILED_ARBITRATION",
            WorkflowStatus::FailedArbitrationException => "FAILED_ARBITRATION_EXCEPTION",
            WorkflowStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Final reconciliation output exposed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalRecord {
    /// Terminal status
    pub status: WorkflowStatus,
    /// Final description as JSON text (None on failure)
    pub description: Option<String>,
    /// All generation attempts, in attempt order
    pub attempts: Vec<CandidateRecord>,
    /// Total prompt tokens across generation and arbitration
    pub tokens_in: u64,
    /// Total completion tokens across generation and arbitration
    pub tokens_out: u64,
    /// Which path produced the description
    pub decision: DecisionPath,
    /// Identifier of the configured arbiter
    pub arbiter_id: String,
    /// Raw arbiter output, or a summary of the consensus path
    pub arbiter_output: Option<String>,
    /// Attributable diagnostics gathered along every failure path
    pub diagnostics: Vec<String>,
}

// ============================================================================
// Producer / Arbiter capabilities
// ============================================================================

/// Input handed to a producer for one generation attempt
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Canonical work title
    pub title: String,
    /// Title with bracketed metadata and edition phrases removed
    pub cleaned_title: String,
    /// Case variations of the title for search coverage
    pub title_variations: Vec<String>,
    /// Internal tracking index
    pub index: String,
    /// Known author names (possibly empty)
    pub known_authors: Vec<String>,
}

/// Input handed to the arbiter for one reconciliation call
#[derive(Debug, Clone)]
pub struct ArbitrationRequest {
    /// Canonical work title
    pub title: String,
    /// Internal tracking index
    pub index: String,
    /// All candidate texts, failed attempts as explicit placeholders
    pub candidates: Vec<String>,
}

/// Successful backend response with token usage
#[derive(Debug, Clone)]
pub struct ProducerResponse {
    /// Raw response text
    pub text: String,
    /// Prompt tokens consumed
    pub tokens_in: u64,
    /// Completion tokens produced
    pub tokens_out: u64,
}

/// Backend invocation error (per-attempt, non-fatal)
#[derive(Debug, Error)]
pub enum ProducerError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Backend returned an error response
    #[error("API error: {0}")]
    Api(String),

    /// Call exceeded the configured timeout
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// Call cancelled by the caller
    #[error("Cancelled")]
    Cancelled,

    /// Response could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}

/// One interchangeable generation backend.
///
/// Implementations must be safe to call concurrently; the pool issues
/// several attempts in parallel against the same instance.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Identifier for provenance tracking
    fn id(&self) -> &str;

    /// Produce one raw description attempt for the requested work
    async fn generate(&self, req: &GenerationRequest) -> Result<ProducerResponse, ProducerError>;
}

/// The single authoritative reconciliation backend
#[async_trait]
pub trait Arbiter: Send + Sync {
    /// Identifier for provenance tracking
    fn id(&self) -> &str;

    /// Reconcile the candidate texts into one final description
    async fn reconcile(&self, req: &ArbitrationRequest)
        -> Result<ProducerResponse, ProducerError>;
}

// ============================================================================
// Workflow events
// ============================================================================

/// Workflow progress events for optional streaming to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    /// Workflow started for a work title
    WorkflowStarted {
        workflow_id: uuid::Uuid,
        title: String,
        /// Unix timestamp (seconds since epoch)
        timestamp: i64,
    },

    /// One generation attempt finished
    AttemptCompleted {
        attempt: usize,
        producer_id: String,
        ok: bool,
    },

    /// Extraction outcome for one candidate
    CandidateExtracted {
        attempt: usize,
        /// Whether a structured record was recovered
        ok: bool,
    },

    /// Consensus resolution finished
    ConsensusComputed {
        record_count: usize,
        consensus_items: usize,
        candidate_items: usize,
        confidence: f64,
    },

    /// Decision gate outcome
    DecisionMade {
        path: DecisionPath,
        /// Unmet conditions when falling back to the arbiter
        reasons: Vec<String>,
    },

    /// Arbitration call finished
    ArbitrationCompleted { ok: bool },

    /// Workflow finished
    WorkflowCompleted {
        workflow_id: uuid::Uuid,
        status: WorkflowStatus,
        /// Unix timestamp (seconds since epoch)
        timestamp: i64,
    },
}
