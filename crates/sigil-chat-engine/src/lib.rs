// Prompt construction, generation and response normalization for Sigil Chat.

pub mod cleaner;
pub mod error;
pub mod inference;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod templates;

#[cfg(feature = "llama")]
pub mod llama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use cleaner::{clean_response, truncate_at_stop_token, DEFAULT_STOP_TOKENS};
pub use error::{EngineError, GenerationError};
pub use inference::{context_size, generate, LanguageModel, ModelInfo, Placement, PlacementGuard, SamplingOptions, TokenId};
pub use pipeline::{run_chat, run_single_turn, ChatOutcome, MIN_NARRATIVE_TOKENS};
pub use loader::{load_prompt_config, resolve_model_file, select_prompt_strategy, GgufMetadata};
pub use prompt::{build_prompt, render_prompt, ChatTemplateRenderer, PromptHandling, PromptStrategy};
pub use templates::JinjaChatTemplate;
