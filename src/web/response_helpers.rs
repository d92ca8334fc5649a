// HTTP response helper functions to reduce duplication across route handlers

use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, VARY,
};
use hyper::{Body, Response, StatusCode};
use serde::Serialize;
use sigil_chat_db::DbError;
use sigil_chat_engine::EngineError;

use crate::{sys_error, sys_warn};

/// Standard CORS headers
const CORS_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const CORS_HEADERS: &str = "content-type, authorization";

fn with_body(status: StatusCode, content_type: Option<&'static str>, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

/// Build a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_string(body) {
        Ok(json) => with_body(status, Some("application/json"), Body::from(json)),
        Err(e) => {
            sys_error!("[RESPONSE] Serialization failed: {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Serialization failed")
        }
    }
}

/// Build a raw JSON string response
pub fn json_raw(status: StatusCode, json: String) -> Response<Body> {
    with_body(status, Some("application/json"), Body::from(json))
}

/// Build a JSON error response: `{"detail": message}`
pub fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    let json = serde_json::json!({ "detail": message }).to_string();
    with_body(status, Some("application/json"), Body::from(json))
}

/// Build a JSON success response: `{"message": message}`
pub fn json_message(message: &str) -> Response<Body> {
    let json = serde_json::json!({ "message": message }).to_string();
    with_body(StatusCode::OK, Some("application/json"), Body::from(json))
}

/// Build an empty response
pub fn empty_response(status: StatusCode) -> Response<Body> {
    with_body(status, None, Body::empty())
}

/// CORS preflight response
pub fn cors_preflight() -> Response<Body> {
    empty_response(StatusCode::NO_CONTENT)
}

pub fn engine_error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::ModelNotLoaded => StatusCode::CONFLICT,
        EngineError::Template(_) | EngineError::Generation(_) | EngineError::ModelLoad(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn engine_error(err: &EngineError) -> Response<Body> {
    let status = engine_error_status(err);
    if status.is_server_error() {
        sys_error!("[ENGINE] {}", err);
    } else {
        sys_warn!("[ENGINE] {}", err);
    }
    json_error(status, &err.to_string())
}

pub fn db_error_status(err: &DbError) -> StatusCode {
    match err {
        DbError::InvalidThreadId(_) => StatusCode::BAD_REQUEST,
        DbError::NotFound(_) => StatusCode::NOT_FOUND,
        DbError::Sqlite { .. } | DbError::Json(_) | DbError::Corrupt { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn db_error(err: &DbError) -> Response<Body> {
    let status = db_error_status(err);
    if status.is_server_error() {
        sys_error!("[DATABASE] {}", err);
    }
    json_error(status, &err.to_string())
}

/// Pick the `access-control-allow-origin` value for a request origin:
/// the origin itself when allowed, else the first configured origin.
pub fn cors_origin(request_origin: Option<&HeaderValue>, allowed: &[String]) -> HeaderValue {
    let requested = request_origin.and_then(|origin| origin.to_str().ok());
    if let Some(origin) = requested.filter(|origin| allowed.iter().any(|a| a == origin)) {
        if let Ok(value) = HeaderValue::from_str(origin) {
            return value;
        }
    }
    allowed
        .first()
        .and_then(|origin| HeaderValue::from_str(origin).ok())
        .unwrap_or_else(|| HeaderValue::from_static("*"))
}

/// Attach CORS headers to an outgoing response.
pub fn apply_cors(response: &mut Response<Body>, origin: HeaderValue) {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(CORS_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(CORS_HEADERS));
    headers.insert(VARY, HeaderValue::from_static("origin"));
}
