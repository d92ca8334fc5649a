// System information route handlers

use hyper::{Body, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;

use sigil_chat_engine::Placement;

use crate::web::response_helpers::json_response;

#[derive(Debug, Serialize)]
pub struct DeviceStatus {
    pub device: Placement,
    pub device_name: &'static str,
}

/// Backend this binary was compiled for.
pub fn device_status() -> DeviceStatus {
    let device = Placement::compiled_accelerator();
    DeviceStatus {
        device,
        device_name: device.device_name(),
    }
}

pub async fn handle_get_device() -> Result<Response<Body>, Infallible> {
    Ok(json_response(StatusCode::OK, &device_status()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_device_matches_build() {
        let response = handle_get_device().await.unwrap();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        let expected = Placement::compiled_accelerator();
        assert_eq!(body["device"], expected.to_string());
        assert_eq!(body["device_name"], expected.device_name());
    }
}
