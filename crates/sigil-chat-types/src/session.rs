use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::Message;
use crate::error::ValidationError;
use crate::settings::SamplingParameters;

/// Maximum characters of the first message used as a session title.
pub const TITLE_PREVIEW_CHARS: usize = 50;

/// A persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub sampling_settings: Option<SamplingParameters>,
    pub system_prompt: Option<String>,
    pub custom_title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Listing entry for the session sidebar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub thread_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl SessionSummary {
    /// Custom title if set, else the first message (clipped to 50 chars), else the id.
    pub fn title_for(thread_id: &str, custom_title: Option<&str>, first_message: Option<&str>) -> String {
        if let Some(title) = custom_title.filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        match first_message {
            Some(content) if !content.is_empty() => {
                let preview: String = content.chars().take(TITLE_PREVIEW_CHARS).collect();
                if content.chars().count() > TITLE_PREVIEW_CHARS {
                    format!("{preview}...")
                } else {
                    preview
                }
            }
            _ => thread_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameSessionRequest {
    pub title: String,
}

impl RenameSessionRequest {
    pub fn trimmed_title(&self) -> Result<&str, ValidationError> {
        match self.title.trim() {
            "" => Err(ValidationError::EmptyTitle),
            title => Ok(title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_title_trimmed() {
        let req = RenameSessionRequest { title: "  Trip plans \n".to_string() };
        assert_eq!(req.trimmed_title(), Ok("Trip plans"));
        let blank = RenameSessionRequest { title: "   ".to_string() };
        assert_eq!(blank.trimmed_title(), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn test_title_prefers_custom() {
        let title = SessionSummary::title_for("t1", Some("Trip plans"), Some("hello"));
        assert_eq!(title, "Trip plans");
    }

    #[test]
    fn test_title_preview_truncates_on_chars() {
        let long = "é".repeat(80);
        let title = SessionSummary::title_for("t1", None, Some(&long));
        assert_eq!(title.chars().count(), TITLE_PREVIEW_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_short_title_has_no_ellipsis() {
        assert_eq!(SessionSummary::title_for("t1", None, Some("hello")), "hello");
    }

    #[test]
    fn test_title_falls_back_to_id() {
        assert_eq!(SessionSummary::title_for("20240101_000000_000001", None, None), "20240101_000000_000001");
    }
}
