//! End-to-end workflow tests with scripted backends
//!
//! Drives the full reconciliation pipeline (generation -> extraction ->
//! normalization -> consensus -> decision -> assembly/arbitration) through
//! in-process Producer/Arbiter implementations.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use wdr_engine::types::{
    ArbitrationRequest, GenerationRequest, ProducerError, ProducerResponse,
};
use wdr_engine::{
    Arbiter, DecisionPath, EngineConfig, Producer, Reconciler, WorkflowRequest, WorkflowStatus,
};

/// Producer that cycles through scripted outputs, one per call
struct ScriptedProducer {
    id: String,
    outputs: Vec<Result<String, String>>,
    calls: AtomicUsize,
}

impl ScriptedProducer {
    fn new(id: &str, outputs: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            outputs,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Producer for ScriptedProducer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, _req: &GenerationRequest) -> Result<ProducerResponse, ProducerError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.outputs[call % self.outputs.len()] {
            Ok(text) => Ok(ProducerResponse {
                text: text.clone(),
                tokens_in: 100,
                tokens_out: 50,
            }),
            Err(detail) => Err(ProducerError::Api(detail.clone())),
        }
    }
}

/// Arbiter that returns a fixed response and records what it was asked
struct ScriptedArbiter {
    response: Result<String, String>,
    seen_request: Mutex<Option<ArbitrationRequest>>,
}

impl ScriptedArbiter {
    fn new(response: Result<String, String>) -> Arc<Self> {
        Arc::new(Self {
            response,
            seen_request: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Arbiter for ScriptedArbiter {
    fn id(&self) -> &str {
        "scripted-arbiter"
    }

    async fn reconcile(
        &self,
        req: &ArbitrationRequest,
    ) -> Result<ProducerResponse, ProducerError> {
        *self.seen_request.lock().unwrap() = Some(req.clone());
        match &self.response {
            Ok(text) => Ok(ProducerResponse {
                text: text.clone(),
                tokens_in: 300,
                tokens_out: 150,
            }),
            Err(detail) => Err(ProducerError::Network(detail.clone())),
        }
    }
}

fn config_with(generators: &[&str]) -> EngineConfig {
    EngineConfig {
        generator_ids: generators.iter().map(|s| s.to_string()).collect(),
        arbiter_id: "scripted-arbiter".to_string(),
        ..Default::default()
    }
}

fn request(title: &str) -> WorkflowRequest {
    WorkflowRequest {
        title: title.to_string(),
        index: "T-1".to_string(),
        known_authors: vec![],
    }
}

fn valid_arbiter_response() -> String {
    [
        "Evaluate Similarity: the surviving description is internally consistent.",
        "Confidence Score: 75",
        "Final Description:",
        "{\"title\": \"Monster\", \"authors\": [\"Naoki Urasawa\"]}",
    ]
    .join("\n")
}

#[tokio::test]
async fn consensus_path_with_one_failed_attempt() {
    // 4 attempts on one producer: 1 fails outright, 3 normalize, 2 share the
    // same author string -> consensus path, SUCCESS
    let producer = ScriptedProducer::new(
        "gen-a",
        vec![
            Ok(r#"{"title": "Monster", "authors": ["Naoki Urasawa"], "main_characters": ["Kenzo Tenma", "Johan"], "status": "Completed"}"#.to_string()),
            Err("backend overloaded".to_string()),
            Ok(r#"{"title": "Monster", "authors": ["Naoki Urasawa"], "main_characters": ["Kenzo Tenma"], "status": "Completed"}"#.to_string()),
            Ok(r#"{"title": "Monster", "authors": ["Somebody Else"], "main_characters": ["Anna"], "status": "Completed"}"#.to_string()),
        ],
    );
    let arbiter = ScriptedArbiter::new(Ok(valid_arbiter_response()));

    let reconciler = Reconciler::new(
        config_with(&["gen-a"]),
        vec![producer as Arc<dyn Producer>],
        arbiter.clone() as Arc<dyn Arbiter>,
    )
    .unwrap();

    let record = reconciler
        .reconcile(&request("Monster"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.status, WorkflowStatus::Success);
    assert_eq!(record.decision, DecisionPath::Consensus);

    // The arbiter was never consulted
    assert!(arbiter.seen_request.lock().unwrap().is_none());

    // The consensus description carries exactly the quorum-agreed author
    let description: serde_json::Value =
        serde_json::from_str(record.description.as_deref().unwrap()).unwrap();
    assert_eq!(description["authors"], serde_json::json!(["Naoki Urasawa"]));
    assert_eq!(description["title"], "Monster");
    assert_eq!(description["main_characters"], serde_json::json!(["Kenzo Tenma"]));

    // 4 attempts recorded, failure included, with its diagnostic
    assert_eq!(record.attempts.len(), 4);
    assert_eq!(record.attempts.iter().filter(|a| a.ok).count(), 3);
    assert!(record
        .diagnostics
        .iter()
        .any(|d| d.contains("backend overloaded")));

    // Token ledger sums the successful generation attempts only (the failed
    // attempt transferred nothing)
    assert_eq!(record.tokens_in, 300);
    assert_eq!(record.tokens_out, 150);
}

#[tokio::test]
async fn single_surviving_record_forces_arbiter() {
    // Only 1 of 4 attempts yields structure -> arbiter path regardless of
    // how confident that single record looks
    let producer = ScriptedProducer::new(
        "gen-a",
        vec![
            Ok(r#"{"title": "Monster", "authors": ["Naoki Urasawa"]}"#.to_string()),
            Ok("I could not find reliable information about this work.".to_string()),
            Ok("Sorry, no structured data available.".to_string()),
            Ok("The work may be self-published; records are sparse.".to_string()),
        ],
    );
    let arbiter = ScriptedArbiter::new(Ok(valid_arbiter_response()));

    let reconciler = Reconciler::new(
        config_with(&["gen-a"]),
        vec![producer as Arc<dyn Producer>],
        arbiter.clone() as Arc<dyn Arbiter>,
    )
    .unwrap();

    let record = reconciler
        .reconcile(&request("Monster"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.decision, DecisionPath::Arbiter);
    assert_eq!(record.status, WorkflowStatus::Success);
    assert!(record
        .diagnostics
        .iter()
        .any(|d| d.contains("insufficient normalized records")));

    // Arbitration tokens are folded into the ledger: 4 * 100 + 300 in
    assert_eq!(record.tokens_in, 700);
    assert_eq!(record.tokens_out, 350);
}

#[tokio::test]
async fn arbiter_missing_confidence_label_fails_arbitration() {
    let producer = ScriptedProducer::new(
        "gen-a",
        vec![Ok("no structure here at all".to_string())],
    );
    let malformed = [
        "Evaluate Similarity: hard to say.",
        "Final Description:",
        "{\"title\": \"Monster\"}",
    ]
    .join("\n");
    let arbiter = ScriptedArbiter::new(Ok(malformed));

    let reconciler = Reconciler::new(
        config_with(&["gen-a"]),
        vec![producer as Arc<dyn Producer>],
        arbiter as Arc<dyn Arbiter>,
    )
    .unwrap();

    let record = reconciler
        .reconcile(&request("Monster"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.status, WorkflowStatus::FailedArbitration);
    assert_eq!(record.decision, DecisionPath::Arbiter);
    assert!(record.description.is_none());
    // The raw response is retained for diagnosis
    assert!(record.arbiter_output.is_some());
}

#[tokio::test]
async fn arbiter_backend_error_is_the_exception_status() {
    let producer = ScriptedProducer::new(
        "gen-a",
        vec![Ok("nothing structured".to_string())],
    );
    let arbiter = ScriptedArbiter::new(Err("connection reset".to_string()));

    let reconciler = Reconciler::new(
        config_with(&["gen-a"]),
        vec![producer as Arc<dyn Producer>],
        arbiter as Arc<dyn Arbiter>,
    )
    .unwrap();

    let record = reconciler
        .reconcile(&request("Monster"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.status, WorkflowStatus::FailedArbitrationException);
    assert!(record.description.is_none());
    assert!(record
        .diagnostics
        .iter()
        .any(|d| d.contains("connection reset")));
}

#[tokio::test]
async fn attempts_cycle_across_producers() {
    // M=2 producers, K=4 attempts: assignment [0, 1, 0, 1]
    let gen_a = ScriptedProducer::new("gen-a", vec![Ok("prose only".to_string())]);
    let gen_b = ScriptedProducer::new("gen-b", vec![Ok("prose only".to_string())]);
    let arbiter = ScriptedArbiter::new(Ok(valid_arbiter_response()));

    let reconciler = Reconciler::new(
        config_with(&["gen-a", "gen-b"]),
        vec![gen_a as Arc<dyn Producer>, gen_b as Arc<dyn Producer>],
        arbiter as Arc<dyn Arbiter>,
    )
    .unwrap();

    let record = reconciler
        .reconcile(&request("Monster"), &CancellationToken::new())
        .await
        .unwrap();

    let producer_ids: Vec<&str> = record
        .attempts
        .iter()
        .map(|a| a.producer_id.as_str())
        .collect();
    assert_eq!(producer_ids, vec!["gen-a", "gen-b", "gen-a", "gen-b"]);
}

#[tokio::test]
async fn failed_attempts_reach_arbiter_as_placeholders() {
    let producer = ScriptedProducer::new(
        "gen-a",
        vec![
            Ok("unparseable prose".to_string()),
            Err("rate limited".to_string()),
        ],
    );
    let arbiter = ScriptedArbiter::new(Ok(valid_arbiter_response()));

    let reconciler = Reconciler::new(
        config_with(&["gen-a"]),
        vec![producer as Arc<dyn Producer>],
        arbiter.clone() as Arc<dyn Arbiter>,
    )
    .unwrap();

    let _ = reconciler
        .reconcile(&request("Monster"), &CancellationToken::new())
        .await
        .unwrap();

    let seen = arbiter.seen_request.lock().unwrap().clone().unwrap();
    // All 4 attempts are represented, failed ones as explicit placeholders
    assert_eq!(seen.candidates.len(), 4);
    assert!(seen.candidates[1].contains("failed: Api") || seen.candidates[1].contains("rate limited"));
    assert!(seen.candidates[1].starts_with("[attempt 2 failed:"));
}

#[tokio::test]
async fn gate_boundary_confidence_exactly_at_threshold() {
    // Data engineered so the confidence lands exactly on the configured
    // threshold: 2 consensus items over 4 candidate items gives
    // (2/4)*100 + 2*10 = 70.0 with no rounding.
    let producer = ScriptedProducer::new(
        "gen-a",
        vec![
            Ok(r#"{"title": "Monster", "authors": ["A", "B"], "main_characters": ["X"]}"#.to_string()),
            Ok(r#"{"title": "Monster", "authors": ["A", "C"], "main_characters": ["X"]}"#.to_string()),
        ],
    );
    let arbiter = ScriptedArbiter::new(Ok(valid_arbiter_response()));

    let mut config = config_with(&["gen-a"]);
    config.attempt_count = 2;
    config.confidence_threshold = 70.0;

    let reconciler = Reconciler::new(
        config,
        vec![producer as Arc<dyn Producer>],
        arbiter.clone() as Arc<dyn Arbiter>,
    )
    .unwrap();

    let record = reconciler
        .reconcile(&request("Monster"), &CancellationToken::new())
        .await
        .unwrap();

    // Exactly-at-threshold selects consensus, not arbiter
    assert_eq!(record.decision, DecisionPath::Consensus);
    assert!(arbiter.seen_request.lock().unwrap().is_none());
}
