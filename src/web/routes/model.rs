// Model route handlers

use hyper::{Body, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::Path;

use sigil_chat_engine::{EngineError, LanguageModel, ModelInfo};
use sigil_chat_types::PromptHandlingMode;

use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{engine_error, json_error, json_message, json_response};
use crate::web::state::AppState;
use crate::{sys_error, sys_info};

#[derive(Debug, Deserialize)]
pub struct ModelLoadRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_mode: Option<PromptHandlingMode>,
}

impl From<Option<ModelInfo>> for ModelStatus {
    fn from(info: Option<ModelInfo>) -> Self {
        match info {
            Some(info) => ModelStatus {
                loaded: true,
                path: Some(info.path),
                name: info.name,
                device: Some(info.placement.to_string()),
                prompt_mode: Some(info.prompt_mode),
            },
            None => ModelStatus {
                loaded: false,
                path: None,
                name: None,
                device: None,
                prompt_mode: None,
            },
        }
    }
}

#[cfg(feature = "llama")]
fn load_weights(path: &Path, gpu_layers: u32) -> Result<Box<dyn LanguageModel>, EngineError> {
    sigil_chat_engine::llama::load_model(path, gpu_layers)
}

#[cfg(not(feature = "llama"))]
fn load_weights(path: &Path, _gpu_layers: u32) -> Result<Box<dyn LanguageModel>, EngineError> {
    Err(EngineError::ModelLoad(format!(
        "Cannot load {}: built without the llama feature",
        path.display()
    )))
}

/// Replace the loaded model with the one at `path`. Blocking.
///
/// The previous model is dropped first so two sets of weights never share memory.
pub fn load_model_into(state: &AppState, path: &Path) -> Result<ModelInfo, EngineError> {
    if let Some(previous) = state.take_model() {
        sys_info!("[MODEL] Unloading {} before loading a new model", previous.info().path);
        drop(previous);
    }
    let model = load_weights(path, state.config.gpu_layers)?;
    let info = model.info();
    state.install_model(model);
    sys_info!(
        "[MODEL] Loaded {} on {} ({} prompts)",
        info.path,
        info.placement,
        info.prompt_mode
    );
    Ok(info)
}

pub async fn handle_get_model_status(state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(json_response(StatusCode::OK, &ModelStatus::from(state.model_info())))
}

pub async fn handle_post_model_load(
    req: Request<Body>,
    state: &AppState,
) -> Result<Response<Body>, Infallible> {
    let load_request: ModelLoadRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };
    if load_request.path.trim().is_empty() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Model path is required"));
    }

    let path = state.config.resolve_model_path(&load_request.path);
    sys_info!("[MODEL] Load requested: {}", path.display());

    let task_state = state.clone();
    let result = tokio::task::spawn_blocking(move || load_model_into(&task_state, &path)).await;

    Ok(match result {
        Ok(Ok(info)) => json_response(
            StatusCode::OK,
            &serde_json::json!({
                "message": "Model loaded successfully.",
                "path": info.path,
                "device": info.placement,
            }),
        ),
        Ok(Err(e)) => engine_error(&e),
        Err(join_err) => {
            sys_error!("[MODEL] Load task failed: {}", join_err);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Model load task failed")
        }
    })
}

pub async fn handle_post_model_unload(state: &AppState) -> Result<Response<Body>, Infallible> {
    let task_state = state.clone();
    // Waits for a running generation to release the model.
    let unloaded = tokio::task::spawn_blocking(move || task_state.take_model().is_some())
        .await
        .unwrap_or(false);

    Ok(if unloaded {
        sys_info!("[MODEL] Model unloaded");
        json_message("Model unloaded successfully.")
    } else {
        json_message("No model was loaded.")
    })
}
