// In-memory model for tests: one token per char, canned reply.

use sigil_chat_types::CustomPromptConfig;

use crate::error::GenerationError;
use crate::inference::{LanguageModel, ModelInfo, Placement, SamplingOptions, TokenId};
use crate::prompt::{PromptHandling, PromptStrategy};
use crate::templates::JinjaChatTemplate;

pub struct MockModel {
    reply: String,
    placement: Placement,
    strategy: PromptStrategy,
    fail_sampling: bool,
    /// Every relocation target, in order.
    pub relocations: Vec<Placement>,
    /// Placement at the time of each `sample` call.
    pub sampled_on: Vec<Placement>,
    pub last_prompt: Option<String>,
    pub last_options: Option<SamplingOptions>,
}

impl MockModel {
    pub const PAD_TOKEN: TokenId = 0;

    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            placement: Placement::Cpu,
            strategy: PromptStrategy::Fallback,
            fail_sampling: false,
            relocations: Vec::new(),
            sampled_on: Vec::new(),
            last_prompt: None,
            last_options: None,
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_custom_config(mut self, config: CustomPromptConfig) -> Self {
        self.strategy = PromptStrategy::Custom(config);
        self
    }

    pub fn with_template(mut self, template: JinjaChatTemplate) -> Self {
        self.strategy = PromptStrategy::Template(template);
        self
    }

    /// Make every `sample` call fail.
    pub fn failing(mut self) -> Self {
        self.fail_sampling = true;
        self
    }
}

fn decode_chars(tokens: &[TokenId]) -> Result<String, GenerationError> {
    tokens
        .iter()
        .map(|&t| {
            u32::try_from(t)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| GenerationError::Detokenize(format!("invalid token {t}")))
        })
        .collect()
}

impl LanguageModel for MockModel {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            path: "mock://model".to_string(),
            name: Some("mock".to_string()),
            placement: self.placement,
            prompt_mode: self.prompt_handling().mode(),
        }
    }

    fn placement(&self) -> Placement {
        self.placement
    }

    fn relocate(&mut self, target: Placement) -> Result<(), GenerationError> {
        self.relocations.push(target);
        self.placement = target;
        Ok(())
    }

    fn prompt_handling(&self) -> PromptHandling<'_> {
        self.strategy.as_handling()
    }

    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, GenerationError> {
        text.chars()
            .map(|c| TokenId::try_from(u32::from(c)).map_err(|e| GenerationError::Tokenization(e.to_string())))
            .collect()
    }

    fn sample(&mut self, input: &[TokenId], options: &SamplingOptions) -> Result<Vec<TokenId>, GenerationError> {
        self.sampled_on.push(self.placement);
        self.last_prompt = Some(decode_chars(input)?);
        self.last_options = Some(options.clone());
        if self.fail_sampling {
            return Err(GenerationError::Sampling("mock sampler failure".to_string()));
        }

        let limit = usize::try_from(options.max_new_tokens).unwrap_or(usize::MAX);
        let mut output = input.to_vec();
        output.extend(self.tokenize(&self.reply)?.into_iter().take(limit));
        Ok(output)
    }

    fn detokenize(&self, tokens: &[TokenId]) -> Result<String, GenerationError> {
        decode_chars(tokens)
    }

    fn pad_token_id(&self) -> Option<TokenId> {
        Some(Self::PAD_TOKEN)
    }
}
