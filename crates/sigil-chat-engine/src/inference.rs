//! Generation invocation contract.
//!
//! A loaded model is anything implementing [`LanguageModel`]. [`generate`] drives
//! one sampled generation and returns only the newly produced text. Models whose
//! current placement can't run sampling are moved to the CPU for the call by a
//! [`PlacementGuard`] and moved back when it drops, on success and on error.

use serde::Serialize;
use sigil_chat_types::{PromptHandlingMode, SamplingParameters};
use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::error::GenerationError;
use crate::prompt::PromptHandling;

pub type TokenId = i32;

/// Fixed top-k used for every sampled generation.
pub const TOP_K: i32 = 50;

/// Smallest context we ever allocate.
pub const MIN_CONTEXT: u32 = 512;

/// Context ceiling for models whose metadata carries no trained length.
pub const FALLBACK_CONTEXT_LIMIT: u32 = 32_768;

/// Context window for one generation: room for the prompt plus
/// `max_new_tokens`, at least [`MIN_CONTEXT`], never beyond the model's
/// trained length. Fails when the prompt alone leaves no room to generate.
pub fn context_size(
    prompt_tokens: usize,
    max_new_tokens: u32,
    trained_length: Option<u64>,
) -> Result<u32, GenerationError> {
    let limit = trained_length.map_or(FALLBACK_CONTEXT_LIMIT, |trained| {
        u32::try_from(trained).unwrap_or(u32::MAX)
    });
    let prompt_len = u32::try_from(prompt_tokens)
        .ok()
        .filter(|len| *len < limit)
        .ok_or_else(|| {
            GenerationError::Context(format!(
                "prompt of {prompt_tokens} tokens does not fit the model's context length of {limit}"
            ))
        })?;

    let wanted = prompt_len.saturating_add(max_new_tokens).max(MIN_CONTEXT);
    if wanted > limit {
        log::warn!("Requested context of {wanted} tokens clamped to {limit}");
    }
    Ok(wanted.min(limit))
}

/// Compute backend a model's weights currently live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Cpu,
    Cuda,
    Metal,
}

impl Placement {
    /// GPU backend this binary was built with, or CPU.
    pub fn compiled_accelerator() -> Placement {
        if cfg!(feature = "cuda") {
            Placement::Cuda
        } else if cfg!(feature = "metal") {
            Placement::Metal
        } else {
            Placement::Cpu
        }
    }

    /// Metal offload is unreliable for sampled generation; everything else is fine.
    pub fn can_generate(self) -> bool {
        !matches!(self, Placement::Metal)
    }

    pub fn device_name(self) -> &'static str {
        match self {
            Placement::Cpu => "CPU",
            Placement::Cuda => "CUDA GPU",
            Placement::Metal => "Apple Metal GPU",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Placement::Cpu => "cpu",
            Placement::Cuda => "cuda",
            Placement::Metal => "metal",
        })
    }
}

/// Options for one call to [`LanguageModel::sample`].
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingOptions {
    pub do_sample: bool,
    pub top_k: i32,
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
    pub pad_token_id: Option<TokenId>,
}

/// Status snapshot of a loaded model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub path: String,
    pub name: Option<String>,
    pub placement: Placement,
    pub prompt_mode: PromptHandlingMode,
}

pub trait LanguageModel: Send {
    fn info(&self) -> ModelInfo;

    fn placement(&self) -> Placement;

    /// Move the weights to `target`. A no-op when already there.
    fn relocate(&mut self, target: Placement) -> Result<(), GenerationError>;

    fn prompt_handling(&self) -> PromptHandling<'_>;

    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, GenerationError>;

    /// Sample a continuation. Returns the input tokens followed by the generated ones.
    fn sample(&mut self, input: &[TokenId], options: &SamplingOptions) -> Result<Vec<TokenId>, GenerationError>;

    /// Decode tokens to text with special tokens stripped.
    fn detokenize(&self, tokens: &[TokenId]) -> Result<String, GenerationError>;

    fn pad_token_id(&self) -> Option<TokenId>;
}

/// Scoped placement for a generation call. Restores the original placement on drop.
pub struct PlacementGuard<'a, M: LanguageModel + ?Sized> {
    model: &'a mut M,
    restore_to: Option<Placement>,
}

impl<'a, M: LanguageModel + ?Sized> PlacementGuard<'a, M> {
    pub fn acquire(model: &'a mut M) -> Result<Self, GenerationError> {
        let current = model.placement();
        if current.can_generate() {
            return Ok(Self { model, restore_to: None });
        }

        log::warn!("{current} placement can't run generation, moving model to cpu");
        model.relocate(Placement::Cpu)?;
        Ok(Self {
            model,
            restore_to: Some(current),
        })
    }
}

impl<M: LanguageModel + ?Sized> Deref for PlacementGuard<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        &*self.model
    }
}

impl<M: LanguageModel + ?Sized> DerefMut for PlacementGuard<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut *self.model
    }
}

impl<M: LanguageModel + ?Sized> Drop for PlacementGuard<'_, M> {
    fn drop(&mut self) {
        if let Some(original) = self.restore_to.take() {
            match self.model.relocate(original) {
                Ok(()) => log::info!("Moved model back to {original}"),
                Err(e) => log::error!("Failed to restore model placement to {original}: {e}"),
            }
        }
    }
}

/// Run one sampled generation and return the decoded continuation only.
pub fn generate<M: LanguageModel + ?Sized>(
    model: &mut M,
    prompt: &str,
    params: &SamplingParameters,
) -> Result<String, GenerationError> {
    let mut model = PlacementGuard::acquire(model)?;

    let input = model.tokenize(prompt)?;
    let input_len = input.len();
    let options = SamplingOptions {
        do_sample: true,
        top_k: TOP_K,
        temperature: params.temperature,
        top_p: params.top_p,
        max_new_tokens: params.max_new_tokens,
        pad_token_id: model.pad_token_id(),
    };
    log::debug!(
        "Generating on {}: temperature={} top_p={} max_new_tokens={}",
        model.placement(),
        options.temperature,
        options.top_p,
        options.max_new_tokens
    );

    let output = model.sample(&input, &options)?;
    let generated = output.get(input_len..).unwrap_or_default();
    log::info!(
        "Tokens in prompt: {input_len}, generated: {} (limit {})",
        generated.len(),
        options.max_new_tokens
    );

    model.detokenize(generated)
}
