// Shared data model for Sigil Chat: messages, prompt configuration,
// generation settings and persisted sessions.

pub mod chat;
pub mod error;
pub mod prompt;
pub mod session;
pub mod settings;

pub use chat::*;
pub use error::ValidationError;
pub use prompt::*;
pub use session::*;
pub use settings::*;
