// Application configuration, read from SIGIL_* environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use log::LevelFilter;
use sigil_chat_engine::Placement;
use sigil_chat_types::{GenerationSettings, SamplingOverrides, SamplingParameters};

pub const ENV_PREFIX: &str = "SIGIL_";

/// Layers offloaded when a GPU backend is compiled in and `SIGIL_GPU_LAYERS` is unset.
pub const ALL_GPU_LAYERS: u32 = 999;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub model_base_directory: PathBuf,
    pub default_model_path: Option<String>,
    pub database_path: String,
    pub default_system_prompt: String,
    pub default_temperature: f64,
    pub default_top_p: f64,
    pub default_max_new_tokens: i64,
    pub cors_allowed_origins: Vec<String>,
    pub themes_path: PathBuf,
    pub log_level: LevelFilter,
    pub gpu_layers: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        let sampling = SamplingParameters::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            model_base_directory: PathBuf::from("./models"),
            default_model_path: None,
            database_path: "sigil_chat.db".to_string(),
            default_system_prompt: GenerationSettings::default().system_prompt,
            default_temperature: f64::from(sampling.temperature),
            default_top_p: f64::from(sampling.top_p),
            default_max_new_tokens: i64::from(sampling.max_new_tokens),
            cors_allowed_origins: parse_origins("http://localhost:5173,http://127.0.0.1:5173"),
            themes_path: PathBuf::from("frontend/public/themes"),
            log_level: LevelFilter::Info,
            gpu_layers: default_gpu_layers(),
        }
    }
}

fn default_gpu_layers() -> u32 {
    match Placement::compiled_accelerator() {
        Placement::Cpu => 0,
        _ => ALL_GPU_LAYERS,
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {ENV_PREFIX}{key}: {raw:?}"))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => PathBuf::from(home),
        (Some(rest), Some(home)) if rest.starts_with('/') || rest.starts_with('\\') => {
            PathBuf::from(home).join(&rest[1..])
        }
        _ => PathBuf::from(path),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Build the config from a key lookup (keys without the prefix).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = parse_var("PORT", &port)?;
        }
        if let Some(dir) = lookup("MODEL_BASE_DIRECTORY") {
            config.model_base_directory = expand_home(&dir);
        }
        config.default_model_path = lookup("DEFAULT_MODEL_PATH").filter(|p| !p.trim().is_empty());
        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = path;
        }
        if let Some(prompt) = lookup("DEFAULT_SYSTEM_PROMPT") {
            config.default_system_prompt = prompt;
        }
        if let Some(value) = lookup("DEFAULT_TEMPERATURE") {
            config.default_temperature = parse_var("DEFAULT_TEMPERATURE", &value)?;
        }
        if let Some(value) = lookup("DEFAULT_TOP_P") {
            config.default_top_p = parse_var("DEFAULT_TOP_P", &value)?;
        }
        if let Some(value) = lookup("DEFAULT_MAX_NEW_TOKENS") {
            config.default_max_new_tokens = parse_var("DEFAULT_MAX_NEW_TOKENS", &value)?;
        }
        if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins = parse_origins(&origins);
        }
        if let Some(path) = lookup("THEMES_PATH") {
            config.themes_path = expand_home(&path);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = parse_var("LOG_LEVEL", &level)?;
        }
        if let Some(layers) = lookup("GPU_LAYERS") {
            config.gpu_layers = parse_var("GPU_LAYERS", &layers)?;
        }

        config
            .generation_settings()
            .context("Invalid default generation settings")?;
        Ok(config)
    }

    /// Initial runtime settings, range-checked like a settings update.
    pub fn generation_settings(&self) -> Result<GenerationSettings, sigil_chat_types::ValidationError> {
        let overrides = SamplingOverrides {
            temperature: Some(self.default_temperature),
            top_p: Some(self.default_top_p),
            max_new_tokens: Some(self.default_max_new_tokens),
        };
        Ok(GenerationSettings {
            system_prompt: self.default_system_prompt.clone(),
            sampling: overrides.apply_to(SamplingParameters::default())?,
        })
    }

    /// Resolve a user supplied model path: `~` is expanded and relative paths
    /// are taken from the model base directory.
    pub fn resolve_model_path(&self, raw: &str) -> PathBuf {
        let expanded = expand_home(raw.trim());
        if expanded.is_absolute() {
            expanded
        } else {
            self.model_base_directory.join(expanded)
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn themes_dir(&self) -> &Path {
        &self.themes_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://localhost:5173", "http://127.0.0.1:5173"]
        );
        assert_eq!(config.default_model_path, None);
        assert_eq!(config.generation_settings().unwrap(), GenerationSettings::default());
    }

    #[test]
    fn test_overrides_from_env() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("PORT", "9001"),
            ("DEFAULT_TEMPERATURE", "1.2"),
            ("DEFAULT_MAX_NEW_TOKENS", "64"),
            ("CORS_ALLOWED_ORIGINS", " http://a.test , ,http://b.test"),
            ("LOG_LEVEL", "debug"),
            ("GPU_LAYERS", "12"),
            ("DEFAULT_MODEL_PATH", "  "),
        ]))
        .unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.cors_allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.gpu_layers, 12);
        assert_eq!(config.default_model_path, None);

        let settings = config.generation_settings().unwrap();
        assert!((settings.sampling.temperature - 1.2).abs() < 1e-6);
        assert_eq!(settings.sampling.max_new_tokens, 64);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("DEFAULT_TOP_P", "1.5")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("DEFAULT_MAX_NEW_TOKENS", "0")])).is_err());
    }

    #[test]
    fn test_resolve_model_path() {
        let config = AppConfig {
            model_base_directory: PathBuf::from("/srv/models"),
            ..AppConfig::default()
        };
        assert_eq!(
            config.resolve_model_path("tinyllama"),
            PathBuf::from("/srv/models/tinyllama")
        );

        let absolute = std::env::temp_dir().join("model.gguf");
        assert_eq!(config.resolve_model_path(absolute.to_str().unwrap()), absolute);
    }

    #[test]
    fn test_expand_home_leaves_other_paths() {
        assert_eq!(expand_home("models/x"), PathBuf::from("models/x"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));
    }
}
