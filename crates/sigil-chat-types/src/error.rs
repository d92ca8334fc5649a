use thiserror::Error;

/// Rejected request shape or out-of-range value.
///
/// The display string is what the HTTP layer returns as the error detail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Unsupported mode '{0}'. Expected 'instruction' or 'chat'.")]
    UnknownMode(String),

    #[error("Invalid role '{0}'. Expected 'system', 'user' or 'assistant'.")]
    UnknownRole(String),

    #[error("'message' is required for instruction mode.")]
    MissingMessage,

    #[error("'messages' must be a non-empty list for chat mode.")]
    MissingMessages,

    #[error("'{field}' is not accepted in {mode} mode.")]
    UnexpectedField { field: &'static str, mode: &'static str },

    #[error("Temperature must be between 0 (exclusive) and 2.0 (inclusive).")]
    Temperature(f64),

    #[error("Top P must be between 0 (exclusive) and 1.0 (inclusive).")]
    TopP(f64),

    #[error("Max new tokens must be positive.")]
    MaxNewTokens(i64),

    #[error("No valid settings provided to update.")]
    EmptyUpdate,

    #[error("Title must not be empty.")]
    EmptyTitle,
}
