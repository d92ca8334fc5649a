// Generation settings route handlers

use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::PoisonError;

use sigil_chat_engine::EngineError;
use sigil_chat_types::SettingsUpdate;

use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{engine_error, json_response};
use crate::web::state::AppState;
use crate::sys_info;

pub async fn handle_get_settings(state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(json_response(StatusCode::OK, &state.settings_snapshot()))
}

pub async fn handle_post_settings(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let update: SettingsUpdate = match parse_json_body(req.into_body()).await {
        Ok(update) => update,
        Err(error_response) => return Ok(error_response),
    };

    let result = state
        .settings
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .apply_update(&update);

    Ok(match result {
        Ok(updated) => {
            sys_info!("[SETTINGS] Updated: {}", serde_json::Value::Object(updated.clone()));
            json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "message": "Generation settings updated successfully.",
                    "updated_settings": updated,
                }),
            )
        }
        Err(e) => engine_error(&EngineError::Validation(e)),
    })
}
