use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http_server::api::client::{ApiError, ApiRequest};

/// Request type for the liveness probe endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivezRequest {}

/// Response type for the liveness probe endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivezResponse {
    pub status: String,
}

impl ApiRequest for LivezRequest {
    type Response = LivezResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/_status/livez")?;
        Ok(client.get(full_url))
    }
}

/// Always answers `{"status":"ok"}` while the process can serve requests.
/// External health checks use it to decide whether the daemon is alive.
#[tracing::instrument]
pub async fn handler() -> Response {
    let msg = serde_json::json!({"status": "ok"});
    (StatusCode::OK, Json(msg)).into_response()
}
