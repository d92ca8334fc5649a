// Request router and server loop.

use hyper::header::ORIGIN;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;

use super::request_parsing::{session_route, SessionRoute};
use super::response_helpers::{apply_cors, cors_origin, cors_preflight, json_error};
use super::routes::{chat, health, model, sessions, settings, system, themes};
use super::state::AppState;
use crate::{sys_debug, sys_info};

pub async fn handle_request(
    req: Request<Body>,
    state: AppState,
) -> Result<Response<Body>, Infallible> {
    let origin = cors_origin(req.headers().get(ORIGIN), &state.config.cors_allowed_origins);
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    sys_debug!("[HTTP] {} {}", method, path);

    let mut response = route(req, &state).await?;
    apply_cors(&mut response, origin);

    sys_info!("[HTTP] {} {} -> {}", method, path, response.status().as_u16());
    Ok(response)
}

async fn route(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => Ok(cors_preflight()),

        (&Method::GET, "/health") => health::handle().await,

        (&Method::GET, "/api/v1/model/status") => model::handle_get_model_status(state).await,
        (&Method::POST, "/api/v1/model/load") => model::handle_post_model_load(req, state).await,
        (&Method::POST, "/api/v1/model/unload") => model::handle_post_model_unload(state).await,

        (&Method::POST, "/api/v1/chat") => chat::handle_post_chat(req, state).await,
        (&Method::POST, "/api/v1/chat/chat-v2") => chat::handle_post_chat_v2(req, state).await,
        (&Method::GET, "/api/v1/chat/sessions") => sessions::handle_get_sessions(state).await,

        (&Method::GET, "/api/v1/settings/current") => settings::handle_get_settings(state).await,
        (&Method::POST, "/api/v1/settings/update") => settings::handle_post_settings(req, state).await,

        (&Method::GET, "/api/v1/system/device") => system::handle_get_device().await,

        (&Method::GET, "/themes") => themes::handle_get_themes(state).await,

        (method, path) => match (method, session_route(path)) {
            (&Method::GET, Some(SessionRoute::Session(id))) => sessions::handle_get_session(&id, state).await,
            (&Method::DELETE, Some(SessionRoute::Session(id))) => {
                sessions::handle_delete_session(&id, state).await
            }
            (&Method::POST, Some(SessionRoute::Rename(id))) => {
                sessions::handle_rename_session(req, &id, state).await
            }
            (_, Some(_)) => Ok(json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")),
            (_, None) => Ok(json_error(StatusCode::NOT_FOUND, "Not Found")),
        },
    }
}

/// Serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> hyper::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
        }
    });

    let server = Server::bind(&addr).serve(make_svc);
    sys_info!("Sigil Chat server listening on http://{}", addr);
    server.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::state::test_support::state_with;
    use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
    use sigil_chat_engine::mock::MockModel;

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let body = body.map_or_else(Body::empty, |json| Body::from(json.to_string()));
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        let response = handle_request(req, state.clone()).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let state = state_with(None);
        let (status, body) = send(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = state_with(None);
        let (status, _) = send(&state, Method::GET, "/api/v1/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, Method::PUT, "/api/v1/chat/session/abc", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let state = state_with(None);
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/chat/chat-v2")
            .header(ORIGIN, "http://127.0.0.1:5173")
            .body(Body::empty())
            .unwrap();
        let response = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "http://127.0.0.1:5173");

        let req = Request::get("/health")
            .header(ORIGIN, "http://elsewhere.test")
            .body(Body::empty())
            .unwrap();
        let response = handle_request(req, state).await.unwrap();
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:5173");
    }

    #[tokio::test]
    async fn test_chat_session_lifecycle() {
        let state = state_with(Some(MockModel::new("Assistant: The answer is 4.")));

        let (status, reply) = send(
            &state,
            Method::POST,
            "/api/v1/chat/chat-v2",
            Some(serde_json::json!({ "mode": "instruction", "message": "What is 2+2?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["response"], "The answer is 4.");
        let thread_id = reply["thread_id"].as_str().unwrap().to_string();

        let (status, list) = send(&state, Method::GET, "/api/v1/chat/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["title"], "What is 2+2?");

        let (status, _) = send(
            &state,
            Method::POST,
            &format!("/api/v1/chat/session/{thread_id}/rename"),
            Some(serde_json::json!({ "title": "Arithmetic" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!("/api/v1/chat/session/{thread_id}");
        let (status, session) = send(&state, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["custom_title"], "Arithmetic");
        assert_eq!(session["messages"].as_array().unwrap().len(), 2);

        let (status, _) = send(&state, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&state, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_update_reaches_next_generation() {
        let state = state_with(Some(MockModel::new("ok")));
        let (status, _) = send(
            &state,
            Method::POST,
            "/api/v1/settings/update",
            Some(serde_json::json!({ "system_prompt": "You are a pirate." })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, reply) = send(
            &state,
            Method::POST,
            "/api/v1/chat/chat-v2",
            Some(serde_json::json!({ "mode": "instruction", "message": "hi", "return_prompt": true })),
        )
        .await;
        assert_eq!(reply["raw_prompt"], "You are a pirate.\n\nUser: hi\nAssistant:");
    }

    #[tokio::test]
    async fn test_model_status_and_unload() {
        let state = state_with(Some(MockModel::new("ok")));
        let (_, status_body) = send(&state, Method::GET, "/api/v1/model/status", None).await;
        assert_eq!(status_body["loaded"], true);

        let (status, _) = send(&state, Method::POST, "/api/v1/model/unload", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &state,
            Method::POST,
            "/api/v1/chat",
            Some(serde_json::json!({ "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["detail"].as_str().unwrap().contains("not loaded"));
    }
}
