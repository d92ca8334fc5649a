// Chat route handlers

use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;

use sigil_chat_db::validate_thread_id;
use sigil_chat_engine::{run_chat, run_single_turn, ChatOutcome, EngineError};
use sigil_chat_types::{
    ChatRequest, ChatRequestV2, ChatResponse, ChatResponseV2, GenerationRequest, GenerationSettings,
    ValidationError,
};

use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{db_error, engine_error, json_error, json_response};
use crate::web::state::AppState;
use crate::{sys_error, sys_info, sys_warn};

fn generation_task_failed(join_err: &tokio::task::JoinError) -> Response<Body> {
    sys_error!("[CHAT] Generation task failed: {}", join_err);
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Generation task failed")
}

pub async fn handle_post_chat(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let chat_request: ChatRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };
    if chat_request.message.trim().is_empty() {
        return Ok(engine_error(&EngineError::Validation(ValidationError::MissingMessage)));
    }

    let settings = state.settings_snapshot();
    let task_state = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut slot = task_state.lock_model();
        let model = slot.as_deref_mut().ok_or(EngineError::ModelNotLoaded)?;
        run_single_turn(model, &settings, &chat_request.message)
    })
    .await;

    Ok(match result {
        Ok(Ok(response)) => json_response(StatusCode::OK, &ChatResponse { response }),
        Ok(Err(e)) => engine_error(&e),
        Err(join_err) => generation_task_failed(&join_err),
    })
}

/// Validate everything the request carries before any model work starts.
fn prepare_v2(
    body: &ChatRequestV2,
    state: &AppState,
) -> Result<(GenerationRequest, GenerationSettings), Response<Body>> {
    let request = body
        .generation_request()
        .map_err(|e| engine_error(&EngineError::Validation(e)))?;
    let settings = state
        .settings_snapshot()
        .with_overrides(body.sampling_settings.as_ref(), body.system_prompt.as_deref())
        .map_err(|e| engine_error(&EngineError::Validation(e)))?;
    if let Some(thread_id) = &body.thread_id {
        validate_thread_id(thread_id).map_err(|e| db_error(&e))?;
    }
    Ok((request, settings))
}

/// Append the new turns to the session. A failure here is reported in the
/// response but never discards the generated text.
fn persist(
    state: &AppState,
    thread_id: Option<&str>,
    outcome: &ChatOutcome,
    settings: &GenerationSettings,
) -> (Option<String>, Option<String>) {
    match state.db.save_chat_messages(
        thread_id,
        &outcome.new_messages,
        Some(&settings.sampling),
        Some(&settings.system_prompt),
    ) {
        Ok(saved_id) => (Some(saved_id), None),
        Err(e) => {
            sys_warn!("[CHAT] Reply generated but session was not saved: {}", e);
            (None, Some(e.to_string()))
        }
    }
}

pub async fn handle_post_chat_v2(
    req: Request<Body>,
    state: &AppState,
) -> Result<Response<Body>, Infallible> {
    let body: ChatRequestV2 = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };
    let (request, settings) = match prepare_v2(&body, state) {
        Ok(prepared) => prepared,
        Err(error_response) => return Ok(error_response),
    };

    sys_info!(
        "[CHAT] {} request, thread {}",
        request.mode(),
        body.thread_id.as_deref().unwrap_or("(new)")
    );

    let task_state = state.clone();
    let task_settings = settings.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut slot = task_state.lock_model();
        let model = slot.as_deref_mut().ok_or(EngineError::ModelNotLoaded)?;
        run_chat(model, &task_settings, &request)
    })
    .await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => return Ok(engine_error(&e)),
        Err(join_err) => return Ok(generation_task_failed(&join_err)),
    };

    let (thread_id, persistence_error) = persist(state, body.thread_id.as_deref(), &outcome, &settings);

    Ok(json_response(
        StatusCode::OK,
        &ChatResponseV2 {
            response: outcome.response,
            raw_prompt: body.return_prompt.then_some(outcome.raw_prompt),
            thread_id,
            persistence_error,
        },
    ))
}
