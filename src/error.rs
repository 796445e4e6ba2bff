// src/error.rs
//
// Error taxonomy. Only ModelUnavailable ends a fight job early; the other
// skip/suppress kinds are recorded in the job's audit log and the job goes on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("fighter {fighter_id} lost by tracker for {gap_secs:.2}s ({start_ts:.3}..{end_ts:.3})")]
    MissingTrack {
        fighter_id: String,
        start_ts: f64,
        end_ts: f64,
        gap_secs: f64,
    },

    #[error("prediction below confidence floor ({confidence:.3} < {floor:.3})")]
    LowConfidenceSkip { confidence: f32, floor: f32 },

    #[error("insufficient sample for {what}: got {got}, need {need}")]
    InsufficientSample { what: String, got: u32, need: u32 },

    #[error("corrupt frame batch for window {window_id} (frames {start_frame}..{end_frame}): {reason}")]
    CorruptFrameBatch {
        window_id: u64,
        start_frame: u64,
        end_frame: u64,
        reason: String,
    },

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference timed out for window {window_id} after {attempts} attempts")]
    InferenceTimeout { window_id: u64, attempts: u32 },

    #[error("job cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("event log schema mismatch: expected {expected}, found {found}")]
    Schema { expected: u32, found: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl MinerError {
    /// Short machine-readable kind used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingTrack { .. } => "missing_track",
            Self::LowConfidenceSkip { .. } => "low_confidence_skip",
            Self::InsufficientSample { .. } => "insufficient_sample",
            Self::CorruptFrameBatch { .. } => "corrupt_frame_batch",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::InferenceTimeout { .. } => "inference_timeout",
            Self::Cancelled => "cancelled",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Schema { .. } => "schema",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Yaml(_) => "yaml",
        }
    }

    /// Errors that end the whole fight job rather than one window or one candidate.
    pub fn is_fatal_for_fight(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_) | Self::InvalidInput(_))
    }
}

/// Failure modes of the frame scorer contract.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScorerError {
    /// The batch could not be scored; only this window is affected.
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    /// The model cannot be reached at all.
    #[error("scorer unavailable: {0}")]
    Unavailable(String),
}

pub type MinerResult<T> = Result<T, MinerError>;
