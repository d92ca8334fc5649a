use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::settings::SamplingOverrides;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// How a request is interpreted: one standalone instruction, or a multi-turn history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Instruction,
    Chat,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::Instruction => "instruction",
            GenerationMode::Chat => "chat",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instruction" => Ok(GenerationMode::Instruction),
            "chat" => Ok(GenerationMode::Chat),
            other => Err(ValidationError::UnknownMode(other.to_string())),
        }
    }
}

/// A validated generation request. Each mode carries exactly the input it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationRequest {
    Instruction { message: String },
    Chat { messages: Vec<Message> },
}

impl GenerationRequest {
    /// Validate the loose wire shape (`mode` + optional `message` / `messages`).
    ///
    /// Instruction mode needs a non-empty `message` and no `messages`; chat mode
    /// needs a non-empty `messages` list and no `message`.
    pub fn from_parts(
        mode: GenerationMode,
        message: Option<String>,
        messages: Option<Vec<Message>>,
    ) -> Result<Self, ValidationError> {
        match mode {
            GenerationMode::Instruction => {
                if messages.is_some() {
                    return Err(ValidationError::UnexpectedField {
                        field: "messages",
                        mode: "instruction",
                    });
                }
                match message {
                    Some(message) if !message.trim().is_empty() => {
                        Ok(GenerationRequest::Instruction { message })
                    }
                    _ => Err(ValidationError::MissingMessage),
                }
            }
            GenerationMode::Chat => {
                if message.is_some() {
                    return Err(ValidationError::UnexpectedField {
                        field: "message",
                        mode: "chat",
                    });
                }
                match messages {
                    Some(messages) if !messages.is_empty() => {
                        Ok(GenerationRequest::Chat { messages })
                    }
                    _ => Err(ValidationError::MissingMessages),
                }
            }
        }
    }

    pub fn mode(&self) -> GenerationMode {
        match self {
            GenerationRequest::Instruction { .. } => GenerationMode::Instruction,
            GenerationRequest::Chat { .. } => GenerationMode::Chat,
        }
    }
}

/// Legacy single-message chat request (`POST /api/v1/chat`).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Mode-aware chat request (`POST /api/v1/chat/chat-v2`).
///
/// `mode` stays a string on the wire so an unknown value surfaces as a
/// validation error instead of a JSON parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequestV2 {
    pub mode: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    #[serde(default)]
    pub return_prompt: bool,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub sampling_settings: Option<SamplingOverrides>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl ChatRequestV2 {
    pub fn generation_request(&self) -> Result<GenerationRequest, ValidationError> {
        let mode: GenerationMode = self.mode.parse()?;
        GenerationRequest::from_parts(mode, self.message.clone(), self.messages.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseV2 {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_prompt: Option<String>,
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_rejects_unknown() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!(
            "tool".parse::<Role>(),
            Err(ValidationError::UnknownRole("tool".to_string()))
        );
    }

    #[test]
    fn test_message_deserializes_lowercase_roles() {
        let msg: Message = serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(msg, Message::assistant("hi"));
        assert!(serde_json::from_str::<Message>(r#"{"role":"bot","content":"hi"}"#).is_err());
    }

    #[test]
    fn test_instruction_requires_message() {
        let err = GenerationRequest::from_parts(GenerationMode::Instruction, None, None).unwrap_err();
        assert_eq!(err, ValidationError::MissingMessage);

        let err = GenerationRequest::from_parts(
            GenerationMode::Instruction,
            Some("   ".to_string()),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingMessage);
    }

    #[test]
    fn test_chat_requires_non_empty_messages() {
        let err = GenerationRequest::from_parts(GenerationMode::Chat, None, Some(vec![])).unwrap_err();
        assert_eq!(err, ValidationError::MissingMessages);
    }

    #[test]
    fn test_wrong_field_for_mode_is_rejected() {
        let err = GenerationRequest::from_parts(
            GenerationMode::Chat,
            Some("hi".to_string()),
            Some(vec![Message::user("hi")]),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnexpectedField { field: "message", .. }));

        let err = GenerationRequest::from_parts(
            GenerationMode::Instruction,
            Some("hi".to_string()),
            Some(vec![Message::user("hi")]),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnexpectedField { field: "messages", .. }));
    }

    #[test]
    fn test_chat_request_v2_unknown_mode() {
        let req: ChatRequestV2 =
            serde_json::from_str(r#"{"mode":"story","message":"hi"}"#).unwrap();
        assert_eq!(
            req.generation_request(),
            Err(ValidationError::UnknownMode("story".to_string()))
        );
    }

    #[test]
    fn test_chat_request_v2_defaults() {
        let req: ChatRequestV2 =
            serde_json::from_str(r#"{"mode":"instruction","message":"hi"}"#).unwrap();
        assert!(!req.return_prompt);
        assert!(req.thread_id.is_none());
        assert_eq!(
            req.generation_request().unwrap(),
            GenerationRequest::Instruction { message: "hi".to_string() }
        );
    }

    #[test]
    fn test_response_v2_omits_empty_optionals() {
        let resp = ChatResponseV2 {
            response: "ok".to_string(),
            raw_prompt: None,
            thread_id: None,
            persistence_error: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("raw_prompt").is_none());
        assert!(json.get("persistence_error").is_none());
        assert!(json["thread_id"].is_null());
    }
}
