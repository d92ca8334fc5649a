// Response normalization: strip speaker tags and cut at stop tokens.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// A `User:` / `Assistant:` tag at the start of any line, any case.
    static ref SPEAKER_TAG: Regex = Regex::new(r"(?im)^\s*\b(User|Assistant):\s*").unwrap();
}

/// Conversation-role markers and end-of-text markers that end a reply.
pub const DEFAULT_STOP_TOKENS: &[&str] = &[
    "\nUser:",
    "\nuser:",
    "\nAssistant:",
    "\nassistant:",
    "</s>",
    "<|endoftext|>",
    "<|user|>",
    "<|assistant|>",
];

/// Remove line-leading speaker tags and trim the result.
/// Tags elsewhere in a line are left alone.
pub fn clean_response(text: &str) -> String {
    SPEAKER_TAG.replace_all(text, "").trim().to_string()
}

/// Cut `text` at the earliest stop token and right-trim.
///
/// `None` or an empty list means [`DEFAULT_STOP_TOKENS`]. Empty tokens are ignored.
/// Text without any stop token is returned unchanged.
pub fn truncate_at_stop_token<S: AsRef<str>>(text: &str, stop_tokens: Option<&[S]>) -> String {
    let earliest = match stop_tokens {
        Some(tokens) if !tokens.is_empty() => earliest_match(text, tokens.iter().map(|t| t.as_ref())),
        _ => earliest_match(text, DEFAULT_STOP_TOKENS.iter().copied()),
    };

    match earliest {
        Some(index) => text[..index].trim_end().to_string(),
        None => text.to_string(),
    }
}

fn earliest_match<'a>(text: &str, tokens: impl Iterator<Item = &'a str>) -> Option<usize> {
    tokens
        .filter(|token| !token.is_empty())
        .filter_map(|token| text.find(token))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_TOKENS: Option<&[&str]> = None;

    #[test]
    fn test_clean_strips_line_leading_tags() {
        assert_eq!(clean_response("User: hello\nAssistant: world"), "hello\nworld");
    }

    #[test]
    fn test_clean_is_case_insensitive_and_allows_indent() {
        assert_eq!(clean_response("   assistant:   Sure thing"), "Sure thing");
        assert_eq!(clean_response("ASSISTANT: ok\n  user: next"), "ok\nnext");
    }

    #[test]
    fn test_clean_keeps_mid_sentence_tags() {
        let text = "I spoke with the Assistant: yesterday";
        assert_eq!(clean_response(text), text);
    }

    #[test]
    fn test_clean_empty_input() {
        assert_eq!(clean_response(""), "");
        assert_eq!(clean_response("  \n "), "");
    }

    #[test]
    fn test_truncate_at_default_token() {
        assert_eq!(truncate_at_stop_token("abc\nUser: xyz", NO_TOKENS), "abc");
    }

    #[test]
    fn test_truncate_without_match_is_unchanged() {
        assert_eq!(
            truncate_at_stop_token("no stop tokens here  ", NO_TOKENS),
            "no stop tokens here  "
        );
    }

    #[test]
    fn test_truncate_picks_earliest_of_several() {
        let text = "answer </s> more\nUser: again <|endoftext|>";
        assert_eq!(truncate_at_stop_token(text, NO_TOKENS), "answer");
    }

    #[test]
    fn test_truncate_order_of_token_list_does_not_matter() {
        let text = "first END then STOP";
        assert_eq!(truncate_at_stop_token(text, Some(&["STOP", "END"][..])), "first");
        assert_eq!(truncate_at_stop_token(text, Some(&["END", "STOP"][..])), "first");
    }

    #[test]
    fn test_truncate_custom_tokens_replace_defaults() {
        let text = "keep </s> this ###";
        assert_eq!(truncate_at_stop_token(text, Some(&["###"][..])), "keep </s> this");
    }

    #[test]
    fn test_truncate_empty_list_uses_defaults() {
        let empty: &[String] = &[];
        assert_eq!(truncate_at_stop_token("hi<|user|>x", Some(empty)), "hi");
    }

    #[test]
    fn test_truncate_ignores_empty_tokens() {
        assert_eq!(truncate_at_stop_token("text", Some(&["", "zzz"][..])), "text");
    }
}
