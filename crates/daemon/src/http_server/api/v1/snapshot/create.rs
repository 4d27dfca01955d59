use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::reason;
use crate::capture::CaptureError;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct CreateSnapshotRequest {
    /// Folder name
    #[arg(long)]
    pub folder: String,

    /// File to capture, absolute or relative to the folder root
    #[arg(long)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSnapshotQuery {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSnapshotResponse {
    pub identifier: Uuid,
}

/// Responds once the local snapshot is durable; uploading happens later
pub async fn handler(
    State(state): State<ServiceState>,
    Path(folder): Path<String>,
    Query(query): Query<CreateSnapshotQuery>,
) -> Result<impl IntoResponse, CreateSnapshotError> {
    let folder = state
        .folder(&folder)
        .ok_or(CreateSnapshotError::UnknownFolder(folder))?;

    let snapshot = folder.submit_snapshot(&query.path).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSnapshotResponse {
            identifier: snapshot.identifier,
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum CreateSnapshotError {
    #[error("unknown folder {0:?}")]
    UnknownFolder(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl IntoResponse for CreateSnapshotError {
    fn into_response(self) -> Response {
        let status = match &self {
            CreateSnapshotError::UnknownFolder(_) => StatusCode::NOT_FOUND,
            CreateSnapshotError::Capture(CaptureError::Validation(_)) => StatusCode::BAD_REQUEST,
            CreateSnapshotError::Capture(CaptureError::Stopped) => StatusCode::SERVICE_UNAVAILABLE,
            CreateSnapshotError::Capture(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "snapshot request failed");
        }
        reason(status, self)
    }
}

impl ApiRequest for CreateSnapshotRequest {
    type Response = CreateSnapshotResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join(&format!("/v1/snapshot/{}", self.folder))?;
        Ok(client.post(full_url).query(&[("path", self.path)]))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::capture::PathValidationError;

    use super::*;

    async fn status_and_reason(err: CreateSnapshotError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, value["reason"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (status, reason) = status_and_reason(CreateSnapshotError::Capture(
            PathValidationError::NotAFile(PathBuf::from("dir")).into(),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reason, "not a regular file: dir");

        let (status, _) =
            status_and_reason(CreateSnapshotError::UnknownFolder("nope".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            status_and_reason(CreateSnapshotError::Capture(CaptureError::WorkerGone)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_request_url() {
        let base = Url::parse("http://127.0.0.1:5050").unwrap();
        let request = CreateSnapshotRequest {
            folder: "docs".into(),
            path: "a b/c.txt".into(),
        }
        .build_request(&base, &Client::new())
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.url().as_str(),
            "http://127.0.0.1:5050/v1/snapshot/docs?path=a+b%2Fc.txt"
        );
    }
}
