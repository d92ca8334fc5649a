use serde::{Deserialize, Serialize};
use std::fmt;

/// Which prompt construction strategy the loaded model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptHandlingMode {
    /// The model ships a chat template that renders the conversation.
    Template,
    /// A prefix/suffix scheme read from `prompt_config.json`.
    Custom,
    /// Plain `User:` / `Assistant:` transcript.
    Fallback,
}

impl fmt::Display for PromptHandlingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromptHandlingMode::Template => "template",
            PromptHandlingMode::Custom => "custom",
            PromptHandlingMode::Fallback => "fallback",
        })
    }
}

/// Role prefix/suffix scheme for models without a usable chat template.
/// Every field may be omitted in `prompt_config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPromptConfig {
    #[serde(default)]
    pub system_prefix: String,
    #[serde(default = "default_system_suffix")]
    pub system_suffix: String,
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
    #[serde(default = "default_user_suffix")]
    pub user_suffix: String,
    #[serde(default = "default_assistant_prefix")]
    pub assistant_prefix: String,
    #[serde(default)]
    pub assistant_suffix: String,
}

fn default_system_suffix() -> String {
    "\n".to_string()
}

fn default_user_prefix() -> String {
    "User: ".to_string()
}

fn default_user_suffix() -> String {
    "\n".to_string()
}

fn default_assistant_prefix() -> String {
    "Assistant: ".to_string()
}

impl Default for CustomPromptConfig {
    fn default() -> Self {
        Self {
            system_prefix: String::new(),
            system_suffix: default_system_suffix(),
            user_prefix: default_user_prefix(),
            user_suffix: default_user_suffix(),
            assistant_prefix: default_assistant_prefix(),
            assistant_suffix: String::new(),
        }
    }
}
