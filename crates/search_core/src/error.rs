//! Error types shared by the search engine and its collaborators.

use thiserror::Error;

/// Errors raised by a [`BatchEvaluator`](crate::BatchEvaluator).
#[derive(Debug, Clone, Error)]
pub enum EvaluatorError {
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Evaluator returned {actual} scores for a batch of {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Evaluation pipeline has shut down")]
    Shutdown,
}

/// Errors surfaced by the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The caller asked for a move that is not legal in the current position.
    #[error("Illegal move requested: {mv}")]
    RulesViolation { mv: String },

    /// The evaluator kept failing after all retries.
    #[error("Evaluator unavailable after {attempts} attempts: {source}")]
    EvaluatorUnavailable {
        attempts: u32,
        #[source]
        source: EvaluatorError,
    },

    /// A position was scored twice with different values. Logged, never fatal.
    #[error("Cache entry for {key} changed from {previous} to {current}")]
    CacheCorruption {
        key: String,
        previous: f32,
        current: f32,
    },

    /// The played moves were not part of the searched tree.
    #[error("Played line is outside the searched tree")]
    RootAdvancementMiss,

    /// `advance` was called with no searched position to advance from.
    #[error("No searched position to advance from")]
    NoActivePosition,

    #[error("Position has no legal moves")]
    NoLegalMoves,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to spawn {name} thread: {source}")]
    WorkerSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}
