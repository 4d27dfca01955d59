use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use url::Url;

use super::reason;
use crate::database::DatabaseError;
use crate::folder::SnapshotSummary;
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

/// Relative path to its history, local chain first
pub type FolderSnapshots = BTreeMap<String, Vec<SnapshotSummary>>;

/// Folder name to its history
pub type ListAllSnapshotsResponse = BTreeMap<String, FolderSnapshots>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAllSnapshotsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSnapshotsRequest {
    pub folder: String,
}

pub async fn all_handler(
    State(state): State<ServiceState>,
) -> Result<impl IntoResponse, ListSnapshotsError> {
    let mut all = ListAllSnapshotsResponse::new();
    for folder in state.folders() {
        all.insert(folder.name().to_string(), folder.list_snapshots().await?);
    }
    Ok((StatusCode::OK, Json(all)).into_response())
}

pub async fn folder_handler(
    State(state): State<ServiceState>,
    Path(folder): Path<String>,
) -> Result<impl IntoResponse, ListSnapshotsError> {
    let folder = state
        .folder(&folder)
        .ok_or(ListSnapshotsError::UnknownFolder(folder))?;
    let snapshots = folder.list_snapshots().await?;
    Ok((StatusCode::OK, Json(snapshots)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum ListSnapshotsError {
    #[error("unknown folder {0:?}")]
    UnknownFolder(String),
    #[error("local index error: {0}")]
    Index(#[from] DatabaseError),
}

impl IntoResponse for ListSnapshotsError {
    fn into_response(self) -> Response {
        match self {
            ListSnapshotsError::UnknownFolder(_) => reason(StatusCode::NOT_FOUND, self),
            ListSnapshotsError::Index(_) => {
                tracing::error!(error = %self, "listing snapshots failed");
                reason(StatusCode::INTERNAL_SERVER_ERROR, self)
            }
        }
    }
}

impl ApiRequest for ListAllSnapshotsRequest {
    type Response = ListAllSnapshotsResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/v1/snapshot")?;
        Ok(client.get(full_url))
    }
}

impl ApiRequest for ListSnapshotsRequest {
    type Response = FolderSnapshots;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join(&format!("/v1/snapshot/{}", self.folder))?;
        Ok(client.get(full_url))
    }
}
