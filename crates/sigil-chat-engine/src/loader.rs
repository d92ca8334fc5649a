//! Model file discovery, GGUF metadata, and prompt strategy selection.
//!
//! None of this touches llama.cpp, so it is shared by the real loader and tests.

use gguf_llms::{GgufHeader, GgufReader, Value};
use sigil_chat_types::CustomPromptConfig;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::prompt::PromptStrategy;
use crate::templates::JinjaChatTemplate;

/// Prefix/suffix config looked up next to the model file.
pub const PROMPT_CONFIG_FILE: &str = "prompt_config.json";

/// Fields read from the GGUF key/value header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GgufMetadata {
    pub architecture: Option<String>,
    pub name: Option<String>,
    pub chat_template: Option<String>,
    pub context_length: Option<u64>,
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Uint32(n) => Some(u64::from(*n)),
        Value::Uint64(n) => Some(*n),
        Value::Int32(n) => u64::try_from(*n).ok(),
        Value::Int64(n) => u64::try_from(*n).ok(),
        _ => None,
    }
}

impl GgufMetadata {
    pub fn read(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path)
            .map_err(|e| EngineError::ModelLoad(format!("failed to open {}: {e}", path.display())))?;
        let mut reader = BufReader::new(file);

        let header = GgufHeader::parse(&mut reader)
            .map_err(|e| EngineError::ModelLoad(format!("failed to parse GGUF header: {e}")))?;
        let metadata = GgufReader::read_metadata(&mut reader, header.n_kv)
            .map_err(|e| EngineError::ModelLoad(format!("failed to read GGUF metadata: {e}")))?;

        let string = |key: &str| match metadata.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };

        let architecture = string("general.architecture");
        let context_length = architecture
            .as_deref()
            .and_then(|arch| metadata.get(&format!("{arch}.context_length")))
            .or_else(|| metadata.get("llama.context_length"))
            .and_then(as_u64);

        Ok(Self {
            name: string("general.name"),
            chat_template: string("tokenizer.chat_template").filter(|t| !t.trim().is_empty()),
            architecture,
            context_length,
        })
    }
}

fn is_gguf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gguf"))
}

/// Accept a `.gguf` file, or a directory holding one (first in name order,
/// which is part 1 for split models).
pub fn resolve_model_file(path: &Path) -> Result<PathBuf, EngineError> {
    if path.is_file() {
        if is_gguf(path) {
            return Ok(path.to_path_buf());
        }
        return Err(EngineError::ModelLoad(format!("{} is not a .gguf file", path.display())));
    }

    if path.is_dir() {
        let entries = fs::read_dir(path)
            .map_err(|e| EngineError::ModelLoad(format!("failed to read {}: {e}", path.display())))?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && is_gguf(p))
            .collect();
        candidates.sort();
        return candidates
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::ModelLoad(format!("no .gguf file found in {}", path.display())));
    }

    Err(EngineError::ModelLoad(format!("invalid model path: '{}'", path.display())))
}

/// Read `prompt_config.json` beside `model_file`, if present.
pub fn load_prompt_config(model_file: &Path) -> Result<Option<CustomPromptConfig>, EngineError> {
    let Some(config_path) = model_file.parent().map(|dir| dir.join(PROMPT_CONFIG_FILE)) else {
        return Ok(None);
    };
    if !config_path.is_file() {
        return Ok(None);
    }

    let raw = fs::read_to_string(&config_path)
        .map_err(|e| EngineError::ModelLoad(format!("failed to read {}: {e}", config_path.display())))?;
    let config = serde_json::from_str(&raw)
        .map_err(|e| EngineError::ModelLoad(format!("invalid {}: {e}", config_path.display())))?;
    Ok(Some(config))
}

/// Custom config wins, then a parseable chat template, then the plain fallback.
pub fn select_prompt_strategy(
    custom: Option<CustomPromptConfig>,
    chat_template: Option<&str>,
    bos_token: &str,
    eos_token: &str,
) -> PromptStrategy {
    if let Some(config) = custom {
        log::info!("Using custom prompt config");
        return PromptStrategy::Custom(config);
    }

    if let Some(source) = chat_template {
        match JinjaChatTemplate::new(source, bos_token, eos_token) {
            Ok(template) => {
                log::info!("Using the model's chat template");
                return PromptStrategy::Template(template);
            }
            Err(e) => log::warn!("Chat template unusable, falling back to plain prompts: {e}"),
        }
    }

    log::info!("No chat template or prompt config, using fallback prompts");
    PromptStrategy::Fallback
}
