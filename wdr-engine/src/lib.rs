//! wdr-engine - Work Description Reconciler
//!
//! Reconciles multiple independently produced, semi-structured descriptions
//! of the same published work into one trustworthy record. Unreliable
//! producers are fanned out in parallel, their noisy output is parsed and
//! normalized into a canonical shape, field-level agreement is scored, and
//! a decision gate picks between the automatically assembled consensus
//! record and a single authoritative arbitration pass.

pub mod arbiter;
pub mod backends;
pub mod config;
pub mod consensus;
pub mod decision;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod pool;
pub mod title;
pub mod types;

pub use crate::config::EngineConfig;
pub use crate::error::{EngineError, EngineResult};
pub use crate::pipeline::{Reconciler, WorkflowRequest};
pub use crate::types::{
    Arbiter, CandidateRecord, ConsensusReport, DecisionPath, FinalRecord, NormalizedRecord,
    Producer, WorkflowEvent, WorkflowStatus,
};
