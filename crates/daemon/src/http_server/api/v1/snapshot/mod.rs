//! Snapshot endpoints
//!
//! - `POST /v1/snapshot/:folder?path=..`: capture one file
//! - `GET /v1/snapshot`: history of every folder
//! - `GET /v1/snapshot/:folder`: history of one folder

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::ServiceState;

mod create;
mod list;

pub use create::{CreateSnapshotRequest, CreateSnapshotResponse};
pub use list::{
    FolderSnapshots, ListAllSnapshotsRequest, ListAllSnapshotsResponse, ListSnapshotsRequest,
};

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", get(list::all_handler))
        .route("/:folder", post(create::handler).get(list::folder_handler))
        .with_state(state)
}

/// Error body shared by the snapshot endpoints
fn reason(status: StatusCode, message: impl std::fmt::Display) -> Response {
    let body = serde_json::json!({ "reason": message.to_string() });
    (status, Json(body)).into_response()
}
