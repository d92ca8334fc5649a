use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};

use crate::error::ValidationError;

/// Sampling knobs forwarded to the model for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParameters {
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
}

impl Default for SamplingParameters {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_new_tokens: 1000,
        }
    }
}

/// Optional sampling values as they arrive over the wire, before range checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingOverrides {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_new_tokens: Option<i64>,
}

impl SamplingOverrides {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none() && self.max_new_tokens.is_none()
    }

    /// Range-check every present value and return a copy of `base` with them applied.
    pub fn apply_to(&self, base: SamplingParameters) -> Result<SamplingParameters, ValidationError> {
        let mut params = base;
        if let Some(temperature) = self.temperature {
            params.temperature = validate_temperature(temperature)?;
        }
        if let Some(top_p) = self.top_p {
            params.top_p = validate_top_p(top_p)?;
        }
        if let Some(max_new_tokens) = self.max_new_tokens {
            params.max_new_tokens = validate_max_new_tokens(max_new_tokens)?;
        }
        Ok(params)
    }
}

fn validate_temperature(value: f64) -> Result<f32, ValidationError> {
    if value > 0.0 && value <= 2.0 {
        Ok(value as f32)
    } else {
        Err(ValidationError::Temperature(value))
    }
}

fn validate_top_p(value: f64) -> Result<f32, ValidationError> {
    if value > 0.0 && value <= 1.0 {
        Ok(value as f32)
    } else {
        Err(ValidationError::TopP(value))
    }
}

fn validate_max_new_tokens(value: i64) -> Result<u32, ValidationError> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or(ValidationError::MaxNewTokens(value))
}

/// Runtime generation settings: the active system prompt and sampling values.
///
/// Seeded from configuration at startup and replaced only through
/// [`GenerationSettings::apply_update`]. Request handlers work on a clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub system_prompt: String,
    #[serde(flatten)]
    pub sampling: SamplingParameters,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            sampling: SamplingParameters::default(),
        }
    }
}

/// Process-wide settings handle. Readers clone a snapshot under the read lock.
pub type SharedSettings = Arc<RwLock<GenerationSettings>>;

/// Partial update body for `POST /api/v1/settings/update`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(flatten)]
    pub sampling: SamplingOverrides,
}

impl GenerationSettings {
    /// Apply a partial update. Either every provided field is valid and applied,
    /// or nothing changes. Returns the fields that were updated.
    pub fn apply_update(&mut self, update: &SettingsUpdate) -> Result<Map<String, Value>, ValidationError> {
        if update.system_prompt.is_none() && update.sampling.is_empty() {
            return Err(ValidationError::EmptyUpdate);
        }

        let sampling = update.sampling.apply_to(self.sampling)?;
        self.sampling = sampling;

        let mut updated = Map::new();
        if let Some(prompt) = &update.system_prompt {
            self.system_prompt.clone_from(prompt);
            updated.insert("system_prompt".to_string(), Value::from(prompt.as_str()));
        }
        if update.sampling.temperature.is_some() {
            updated.insert("temperature".to_string(), Value::from(f64::from(sampling.temperature)));
        }
        if update.sampling.top_p.is_some() {
            updated.insert("top_p".to_string(), Value::from(f64::from(sampling.top_p)));
        }
        if update.sampling.max_new_tokens.is_some() {
            updated.insert("max_new_tokens".to_string(), Value::from(sampling.max_new_tokens));
        }
        Ok(updated)
    }

    /// Per-request view with optional overrides layered on top.
    pub fn with_overrides(
        &self,
        sampling: Option<&SamplingOverrides>,
        system_prompt: Option<&str>,
    ) -> Result<GenerationSettings, ValidationError> {
        let mut settings = self.clone();
        if let Some(overrides) = sampling {
            settings.sampling = overrides.apply_to(settings.sampling)?;
        }
        if let Some(prompt) = system_prompt {
            settings.system_prompt = prompt.to_string();
        }
        Ok(settings)
    }
}
