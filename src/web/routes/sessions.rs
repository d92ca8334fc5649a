// Chat session route handlers

use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;

use sigil_chat_db::DbError;
use sigil_chat_engine::EngineError;
use sigil_chat_types::RenameSessionRequest;

use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{db_error, engine_error, json_message, json_response};
use crate::web::state::AppState;
use crate::sys_info;

fn session_not_found(thread_id: &str) -> Response<Body> {
    db_error(&DbError::NotFound(thread_id.to_string()))
}

pub async fn handle_get_sessions(state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(match state.db.list_sessions() {
        Ok(sessions) => json_response(StatusCode::OK, &sessions),
        Err(e) => db_error(&e),
    })
}

pub async fn handle_get_session(thread_id: &str, state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(match state.db.get_session(thread_id) {
        Ok(Some(session)) => json_response(StatusCode::OK, &session),
        Ok(None) => session_not_found(thread_id),
        Err(e) => db_error(&e),
    })
}

pub async fn handle_delete_session(thread_id: &str, state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(match state.db.delete_session(thread_id) {
        Ok(true) => json_message(&format!("Session {thread_id} deleted.")),
        Ok(false) => session_not_found(thread_id),
        Err(e) => db_error(&e),
    })
}

pub async fn handle_rename_session(
    req: Request<Body>,
    thread_id: &str,
    state: &AppState,
) -> Result<Response<Body>, Infallible> {
    let rename: RenameSessionRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };
    let title = match rename.trimmed_title() {
        Ok(title) => title,
        Err(e) => return Ok(engine_error(&EngineError::Validation(e))),
    };

    Ok(match state.db.rename_session(thread_id, title) {
        Ok(true) => {
            sys_info!("[SESSIONS] Renamed {} to {:?}", thread_id, title);
            json_response(
                StatusCode::OK,
                &serde_json::json!({ "thread_id": thread_id, "title": title }),
            )
        }
        Ok(false) => session_not_found(thread_id),
        Err(e) => db_error(&e),
    })
}
