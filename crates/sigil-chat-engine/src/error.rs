use sigil_chat_types::ValidationError;
use thiserror::Error;

use crate::inference::Placement;

/// Failure inside tokenization, sampling or decoding.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    #[error("failed to create inference context: {0}")]
    Context(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("sampling failed: {0}")]
    Sampling(String),

    #[error("detokenization failed: {0}")]
    Detokenize(String),

    #[error("failed to move model to {target}: {reason}")]
    Placement { target: Placement, reason: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("chat template error: {0}")]
    Template(String),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Model is not loaded. Please load a model first.")]
    ModelNotLoaded,

    #[error("failed to load model: {0}")]
    ModelLoad(String),
}
