// llama.cpp backed implementation of LanguageModel.

use lazy_static::lazy_static;
use llama_cpp_2::{
    context::params::LlamaContextParams,
    llama_backend::LlamaBackend,
    llama_batch::LlamaBatch,
    model::{params::LlamaModelParams, AddBos, LlamaModel, Special},
    sampling::LlamaSampler,
    token::LlamaToken,
};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, GenerationError};
use crate::inference::{context_size, LanguageModel, ModelInfo, Placement, SamplingOptions, TokenId};
use crate::loader::{load_prompt_config, resolve_model_file, select_prompt_strategy, GgufMetadata};
use crate::prompt::{PromptHandling, PromptStrategy};

lazy_static! {
    // llama.cpp's backend may only be initialized once per process
    static ref BACKEND: Result<LlamaBackend, String> = LlamaBackend::init().map_err(|e| e.to_string());
}

fn backend() -> Result<&'static LlamaBackend, String> {
    BACKEND
        .as_ref()
        .map_err(|e| format!("failed to initialize llama backend: {e}"))
}

fn token_text(model: &LlamaModel, token: LlamaToken) -> String {
    model
        .token_to_bytes(token, Special::Tokenize)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn load_weights(path: &Path, gpu_layers: u32) -> Result<LlamaModel, String> {
    let params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
    LlamaModel::load_from_file(backend()?, path, &params).map_err(|e| e.to_string())
}

pub struct LlamaCppModel {
    model: LlamaModel,
    path: PathBuf,
    gpu_layers: u32,
    placement: Placement,
    metadata: GgufMetadata,
    strategy: PromptStrategy,
    bos_text: String,
}

impl LlamaCppModel {
    /// Load a GGUF model (file or directory) offloading `gpu_layers` layers.
    pub fn load(path: &Path, gpu_layers: u32) -> Result<Self, EngineError> {
        let file = resolve_model_file(path)?;
        let metadata = GgufMetadata::read(&file)?;
        log::info!(
            "Loading {} ({}) with {gpu_layers} GPU layers",
            file.display(),
            metadata.name.as_deref().unwrap_or("unnamed")
        );

        let model = load_weights(&file, gpu_layers).map_err(EngineError::ModelLoad)?;
        let bos_text = token_text(&model, model.token_bos());
        let eos_text = token_text(&model, model.token_eos());

        let custom = load_prompt_config(&file)?;
        let strategy = select_prompt_strategy(custom, metadata.chat_template.as_deref(), &bos_text, &eos_text);

        let placement = if gpu_layers == 0 {
            Placement::Cpu
        } else {
            Placement::compiled_accelerator()
        };
        log::info!("Model loaded on {placement}");

        Ok(Self {
            model,
            path: file,
            gpu_layers,
            placement,
            metadata,
            strategy,
            bos_text,
        })
    }
}

/// Boxed loader for callers that only need the trait object.
pub fn load_model(path: &Path, gpu_layers: u32) -> Result<Box<dyn LanguageModel>, EngineError> {
    Ok(Box::new(LlamaCppModel::load(path, gpu_layers)?))
}

impl LanguageModel for LlamaCppModel {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            path: self.path.display().to_string(),
            name: self.metadata.name.clone(),
            placement: self.placement,
            prompt_mode: self.strategy.as_handling().mode(),
        }
    }

    fn placement(&self) -> Placement {
        self.placement
    }

    fn relocate(&mut self, target: Placement) -> Result<(), GenerationError> {
        if target == self.placement {
            return Ok(());
        }
        let layers = match target {
            Placement::Cpu => 0,
            Placement::Cuda | Placement::Metal => self.gpu_layers,
        };
        log::info!("Reloading weights on {target} ({layers} GPU layers)");
        self.model = load_weights(&self.path, layers)
            .map_err(|reason| GenerationError::Placement { target, reason })?;
        self.placement = target;
        Ok(())
    }

    fn prompt_handling(&self) -> PromptHandling<'_> {
        self.strategy.as_handling()
    }

    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, GenerationError> {
        // Chat templates usually render the BOS token themselves
        let add_bos = if !self.bos_text.is_empty() && text.starts_with(&self.bos_text) {
            AddBos::Never
        } else {
            AddBos::Always
        };
        self.model
            .str_to_token(text, add_bos)
            .map(|tokens| tokens.into_iter().map(|t| t.0).collect())
            .map_err(|e| GenerationError::Tokenization(e.to_string()))
    }

    fn sample(&mut self, input: &[TokenId], options: &SamplingOptions) -> Result<Vec<TokenId>, GenerationError> {
        let backend = backend().map_err(GenerationError::Context)?;
        let Some(last_index) = input.len().checked_sub(1) else {
            return Err(GenerationError::Tokenization("prompt produced no tokens".to_string()));
        };
        let n_ctx = context_size(input.len(), options.max_new_tokens, self.metadata.context_length)?;
        // Clamped contexts shorten the generation budget with them
        let room = n_ctx.saturating_sub(u32::try_from(input.len()).unwrap_or(u32::MAX));
        let max_new_tokens = options.max_new_tokens.min(room);

        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(n_ctx))
            .with_n_batch(n_ctx);
        let mut ctx = self
            .model
            .new_context(backend, ctx_params)
            .map_err(|e| GenerationError::Context(e.to_string()))?;

        let mut batch = LlamaBatch::new(input.len(), 1);
        let mut pos: i32 = 0;
        for (i, &token) in input.iter().enumerate() {
            batch
                .add(LlamaToken::new(token), pos, &[0], i == last_index)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
            pos += 1;
        }
        ctx.decode(&mut batch)
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        let mut sampler = if options.do_sample {
            let seed = chrono::Utc::now().timestamp_subsec_nanos();
            LlamaSampler::chain_simple([
                LlamaSampler::top_k(options.top_k),
                LlamaSampler::top_p(options.top_p, 1),
                LlamaSampler::temp(options.temperature),
                LlamaSampler::dist(seed),
            ])
        } else {
            LlamaSampler::greedy()
        };

        let mut output = input.to_vec();
        for _ in 0..max_new_tokens {
            let token = sampler.sample(&ctx, -1);
            if self.model.is_eog_token(token) {
                break;
            }
            output.push(token.0);

            batch.clear();
            batch
                .add(token, pos, &[0], true)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
            pos += 1;
            ctx.decode(&mut batch)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;
        }

        Ok(output)
    }

    fn detokenize(&self, tokens: &[TokenId]) -> Result<String, GenerationError> {
        let mut bytes = Vec::new();
        for &token in tokens {
            let piece = self
                .model
                .token_to_bytes(LlamaToken::new(token), Special::Plaintext)
                .map_err(|e| GenerationError::Detokenize(e.to_string()))?;
            bytes.extend_from_slice(&piece);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn pad_token_id(&self) -> Option<TokenId> {
        // GGUF models rarely define a pad token; EOS stands in
        Some(self.model.token_eos().0)
    }
}
