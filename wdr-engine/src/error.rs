//! Error types for the reconciliation engine

use thiserror::Error;

/// Engine-level errors.
///
/// Per-attempt generation, extraction, and normalization failures never show
/// up here; they are recovered locally and folded into diagnostics. Total
/// arbitration failure surfaces as a terminal `FinalRecord` status rather
/// than an error. Only configuration problems abort a workflow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration (e.g. zero producers) — fatal, raised before
    /// any attempt is made
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Shared error
    #[error(transparent)]
    Common(#[from] wdr_common::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
