// Chat pipeline: build prompt, generate, clean, truncate.

use sigil_chat_types::{GenerationMode, GenerationRequest, GenerationSettings, Message, Role};

use crate::cleaner::{clean_response, truncate_at_stop_token};
use crate::error::EngineError;
use crate::inference::{generate, LanguageModel};
use crate::prompt::render_prompt;

/// Chat replies get at least this many new tokens regardless of settings.
pub const MIN_NARRATIVE_TOKENS: u32 = 350;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    /// Cleaned and truncated reply.
    pub response: String,
    /// Exact prompt text sent to the model.
    pub raw_prompt: String,
    /// Turns to append to the session: the new user turn (if any) and the reply.
    pub new_messages: Vec<Message>,
}

/// Run one request against `model` with a settings snapshot taken by the caller.
pub fn run_chat<M: LanguageModel + ?Sized>(
    model: &mut M,
    settings: &GenerationSettings,
    request: &GenerationRequest,
) -> Result<ChatOutcome, EngineError> {
    let handling = model.prompt_handling();
    let prompt_mode = handling.mode();
    let raw_prompt = render_prompt(request, &settings.system_prompt, handling)?;

    let mut sampling = settings.sampling;
    if request.mode() == GenerationMode::Chat {
        sampling.max_new_tokens = sampling.max_new_tokens.max(MIN_NARRATIVE_TOKENS);
    }
    log::info!(
        "{} request with {prompt_mode} prompt ({} chars)",
        request.mode(),
        raw_prompt.len()
    );

    let generated = generate(model, &raw_prompt, &sampling)?;
    let response = truncate_at_stop_token::<&str>(&clean_response(&generated), None);

    let mut new_messages = Vec::with_capacity(2);
    match request {
        GenerationRequest::Instruction { message } => new_messages.push(Message::user(message.as_str())),
        GenerationRequest::Chat { messages } => {
            if let Some(last) = messages.last().filter(|m| m.role == Role::User) {
                new_messages.push(last.clone());
            }
        }
    }
    new_messages.push(Message::assistant(response.as_str()));

    Ok(ChatOutcome {
        response,
        raw_prompt,
        new_messages,
    })
}

/// Legacy single message chat: one user turn, narrative token floor always applied.
pub fn run_single_turn<M: LanguageModel + ?Sized>(
    model: &mut M,
    settings: &GenerationSettings,
    message: &str,
) -> Result<String, EngineError> {
    let request = GenerationRequest::from_parts(GenerationMode::Instruction, Some(message.to_string()), None)?;
    let mut settings = settings.clone();
    settings.sampling.max_new_tokens = settings.sampling.max_new_tokens.max(MIN_NARRATIVE_TOKENS);
    run_chat(model, &settings, &request).map(|outcome| outcome.response)
}
