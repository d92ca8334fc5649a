//! Prompt builder.
//!
//! Turns a validated [`GenerationRequest`] into the exact text fed to the model,
//! using whichever strategy the loaded model advertises. The caller's history is
//! never modified: when a system turn has to be prepended a new list is built.

use sigil_chat_types::{
    CustomPromptConfig, GenerationMode, GenerationRequest, Message, PromptHandlingMode, Role,
};
use std::borrow::Cow;

use crate::error::EngineError;
use crate::templates::JinjaChatTemplate;

/// A model-defined chat template. Output format is opaque to the builder.
pub trait ChatTemplateRenderer {
    fn render(&self, messages: &[Message], add_generation_prompt: bool) -> Result<String, EngineError>;
}

/// Prompt strategy attached to a loaded model.
#[derive(Clone, Copy)]
pub enum PromptHandling<'a> {
    Template(&'a dyn ChatTemplateRenderer),
    Custom(&'a CustomPromptConfig),
    Fallback,
}

impl PromptHandling<'_> {
    pub fn mode(&self) -> PromptHandlingMode {
        match self {
            PromptHandling::Template(_) => PromptHandlingMode::Template,
            PromptHandling::Custom(_) => PromptHandlingMode::Custom,
            PromptHandling::Fallback => PromptHandlingMode::Fallback,
        }
    }
}

impl std::fmt::Debug for PromptHandling<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptHandling::Custom(config) => f.debug_tuple("Custom").field(config).finish(),
            other => write!(f, "{}", other.mode()),
        }
    }
}

/// Owned prompt strategy held by a loaded model.
#[derive(Debug, Clone)]
pub enum PromptStrategy {
    Template(JinjaChatTemplate),
    Custom(CustomPromptConfig),
    Fallback,
}

impl PromptStrategy {
    pub fn as_handling(&self) -> PromptHandling<'_> {
        match self {
            PromptStrategy::Template(template) => PromptHandling::Template(template),
            PromptStrategy::Custom(config) => PromptHandling::Custom(config),
            PromptStrategy::Fallback => PromptHandling::Fallback,
        }
    }
}

/// Validate the loose request shape, then render it.
///
/// Fails with [`EngineError::Validation`] before any rendering when the fields
/// don't match `mode`.
pub fn build_prompt(
    mode: GenerationMode,
    system_prompt: &str,
    handling: PromptHandling<'_>,
    message: Option<&str>,
    messages: Option<&[Message]>,
) -> Result<String, EngineError> {
    let request = GenerationRequest::from_parts(
        mode,
        message.map(str::to_string),
        messages.map(<[Message]>::to_vec),
    )?;
    render_prompt(&request, system_prompt, handling)
}

/// Render an already-validated request with the given strategy.
pub fn render_prompt(
    request: &GenerationRequest,
    system_prompt: &str,
    handling: PromptHandling<'_>,
) -> Result<String, EngineError> {
    match handling {
        PromptHandling::Custom(config) => Ok(render_custom(request, system_prompt, config)),
        PromptHandling::Template(template) => {
            let turns = match request {
                GenerationRequest::Instruction { message } => {
                    Cow::Owned(vec![Message::system(system_prompt), Message::user(message.as_str())])
                }
                GenerationRequest::Chat { messages } => with_system_turn(system_prompt, messages),
            };
            template.render(&turns, true)
        }
        PromptHandling::Fallback => Ok(render_fallback(request, system_prompt)),
    }
}

/// The history with a system turn in front, unless it already starts with one.
fn with_system_turn<'a>(system_prompt: &str, messages: &'a [Message]) -> Cow<'a, [Message]> {
    match messages.first() {
        Some(first) if first.role == Role::System => Cow::Borrowed(messages),
        _ => {
            let mut turns = Vec::with_capacity(messages.len() + 1);
            turns.push(Message::system(system_prompt));
            turns.extend_from_slice(messages);
            Cow::Owned(turns)
        }
    }
}

fn render_custom(request: &GenerationRequest, system_prompt: &str, config: &CustomPromptConfig) -> String {
    match request {
        GenerationRequest::Instruction { message } => format!(
            "{}{}{}{}{}{}{}",
            config.system_prefix,
            system_prompt,
            config.system_suffix,
            config.user_prefix,
            message,
            config.user_suffix,
            config.assistant_prefix
        ),
        GenerationRequest::Chat { messages } => {
            let mut prompt = String::new();
            for turn in with_system_turn(system_prompt, messages).iter() {
                let (prefix, suffix) = match turn.role {
                    Role::System => (&config.system_prefix, &config.system_suffix),
                    Role::User => (&config.user_prefix, &config.user_suffix),
                    Role::Assistant => (&config.assistant_prefix, &config.assistant_suffix),
                };
                prompt.push_str(prefix);
                prompt.push_str(&turn.content);
                prompt.push_str(suffix);
            }
            prompt.push_str(&config.assistant_prefix);
            prompt
        }
    }
}

fn render_fallback(request: &GenerationRequest, system_prompt: &str) -> String {
    match request {
        GenerationRequest::Instruction { message } => {
            format!("{system_prompt}\n\nUser: {message}\nAssistant:")
        }
        GenerationRequest::Chat { messages } => {
            let mut lines = vec![system_prompt.to_string(), String::new()];
            for turn in messages {
                match turn.role {
                    Role::User => lines.push(format!("User: {}", turn.content)),
                    Role::System | Role::Assistant => lines.push(format!("Assistant: {}", turn.content)),
                }
            }
            lines.push("Assistant:".to_string());
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_chat_types::ValidationError;
    use std::sync::Mutex;

    /// Renders `role|content` lines and remembers every call.
    #[derive(Default)]
    struct RecordingTemplate {
        calls: Mutex<Vec<(Vec<Message>, bool)>>,
    }

    impl ChatTemplateRenderer for RecordingTemplate {
        fn render(&self, messages: &[Message], add_generation_prompt: bool) -> Result<String, EngineError> {
            self.calls
                .lock()
                .unwrap()
                .push((messages.to_vec(), add_generation_prompt));
            Ok(messages
                .iter()
                .map(|m| format!("{}|{}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }

    fn chat(messages: &[Message], handling: PromptHandling<'_>) -> Result<String, EngineError> {
        build_prompt(GenerationMode::Chat, "S", handling, None, Some(messages))
    }

    #[test]
    fn test_fallback_instruction() {
        let prompt =
            build_prompt(GenerationMode::Instruction, "S", PromptHandling::Fallback, Some("hi"), None).unwrap();
        assert_eq!(prompt, "S\n\nUser: hi\nAssistant:");
    }

    #[test]
    fn test_fallback_chat() {
        let prompt = chat(
            &[Message::user("a"), Message::assistant("b")],
            PromptHandling::Fallback,
        )
        .unwrap();
        assert_eq!(prompt, "S\n\nUser: a\nAssistant: b\nAssistant:");
    }

    #[test]
    fn test_fallback_chat_treats_system_turn_as_assistant() {
        let prompt = chat(
            &[Message::system("rules"), Message::user("a")],
            PromptHandling::Fallback,
        )
        .unwrap();
        assert_eq!(prompt, "S\n\nAssistant: rules\nUser: a\nAssistant:");
    }

    #[test]
    fn test_custom_instruction_with_defaults() {
        let config = CustomPromptConfig::default();
        let prompt = build_prompt(
            GenerationMode::Instruction,
            "S",
            PromptHandling::Custom(&config),
            Some("hi"),
            None,
        )
        .unwrap();
        assert_eq!(prompt, "S\nUser: hi\nAssistant: ");
    }

    #[test]
    fn test_custom_chat_prepends_system_and_cues_assistant() {
        let config = CustomPromptConfig {
            system_prefix: "<s>".to_string(),
            system_suffix: "</s>".to_string(),
            user_prefix: "<u>".to_string(),
            user_suffix: "</u>".to_string(),
            assistant_prefix: "<a>".to_string(),
            assistant_suffix: "</a>".to_string(),
        };
        let prompt = chat(
            &[Message::user("q1"), Message::assistant("r1"), Message::user("q2")],
            PromptHandling::Custom(&config),
        )
        .unwrap();
        assert_eq!(prompt, "<s>S</s><u>q1</u><a>r1</a><u>q2</u><a>");
    }

    #[test]
    fn test_custom_chat_keeps_existing_system_turn() {
        let config = CustomPromptConfig::default();
        let prompt = chat(
            &[Message::system("Own rules"), Message::user("q")],
            PromptHandling::Custom(&config),
        )
        .unwrap();
        assert_eq!(prompt, "Own rules\nUser: q\nAssistant: ");
    }

    #[test]
    fn test_template_instruction_renders_system_and_user() {
        let template = RecordingTemplate::default();
        let prompt = build_prompt(
            GenerationMode::Instruction,
            "S",
            PromptHandling::Template(&template),
            Some("hi"),
            None,
        )
        .unwrap();
        assert_eq!(prompt, "system|S\nuser|hi");

        let calls = template.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1, "generation prompt marker must be requested");
    }

    #[test]
    fn test_template_chat_has_exactly_one_system_turn() {
        let template = RecordingTemplate::default();
        let without = vec![Message::user("a")];
        let with = vec![Message::system("mine"), Message::user("a")];

        chat(&without, PromptHandling::Template(&template)).unwrap();
        chat(&with, PromptHandling::Template(&template)).unwrap();

        let calls = template.calls.lock().unwrap();
        for (rendered, _) in calls.iter() {
            assert_eq!(rendered[0].role, Role::System);
            assert_eq!(rendered.iter().filter(|m| m.role == Role::System).count(), 1);
        }
        assert_eq!(calls[0].0[0].content, "S");
        assert_eq!(calls[1].0[0].content, "mine");
    }

    #[test]
    fn test_caller_history_is_not_modified() {
        let template = RecordingTemplate::default();
        let config = CustomPromptConfig::default();
        let history = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
        let snapshot = history.clone();

        chat(&history, PromptHandling::Template(&template)).unwrap();
        chat(&history, PromptHandling::Custom(&config)).unwrap();
        chat(&history, PromptHandling::Fallback).unwrap();

        assert_eq!(history, snapshot);
    }

    #[test]
    fn test_build_is_deterministic() {
        let config = CustomPromptConfig::default();
        let history = [Message::user("a"), Message::assistant("b")];
        let first = chat(&history, PromptHandling::Custom(&config)).unwrap();
        let second = chat(&history, PromptHandling::Custom(&config)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_validation_errors_before_rendering() {
        let template = RecordingTemplate::default();

        let err = chat(&[], PromptHandling::Template(&template)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::MissingMessages)));

        let err = build_prompt(
            GenerationMode::Instruction,
            "S",
            PromptHandling::Template(&template),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::MissingMessage)));

        assert!(template.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handling_mode_reported() {
        let config = CustomPromptConfig::default();
        assert_eq!(PromptHandling::Custom(&config).mode(), PromptHandlingMode::Custom);
        assert_eq!(PromptHandling::Fallback.mode(), PromptHandlingMode::Fallback);
    }
}
