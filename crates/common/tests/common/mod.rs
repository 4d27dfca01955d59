//! Shared helpers for integration tests
//!
//! The fake grid speaks the grid node's `/uri` web API on an ephemeral port
//! and keeps everything in a [`MemoryGrid`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tempfile::TempDir;
use url::Url;

use ::common::crypto::{create_local_author, LocalAuthor};
use ::common::grid::{Capability, DirectoryFields, Grid, GridError, MemoryGrid};
use ::common::snapshot::{LocalSnapshot, Metadata};

#[derive(Clone)]
struct FakeGrid {
    grid: MemoryGrid,
    put_status: StatusCode,
    mkdir_status: StatusCode,
}

/// Status codes the fake grid answers successful calls with
#[derive(Debug, Clone, Copy)]
pub struct FakeGridStatus {
    pub put: StatusCode,
    pub mkdir: StatusCode,
}

impl Default for FakeGridStatus {
    fn default() -> Self {
        Self {
            put: StatusCode::CREATED,
            mkdir: StatusCode::OK,
        }
    }
}

fn grid_error(e: GridError) -> Response {
    match e {
        GridError::Api(api) => (
            StatusCode::from_u16(api.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            api.body,
        )
            .into_response(),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}

async fn put_handler(State(state): State<FakeGrid>, body: Bytes) -> Response {
    match state.grid.put_immutable(body).await {
        Ok(cap) => (state.put_status, format!("{}\n", cap)).into_response(),
        Err(e) => grid_error(e),
    }
}

async fn post_handler(
    State(state): State<FakeGrid>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if query.get("t").map(String::as_str) != Some("mkdir-immutable") {
        return (StatusCode::BAD_REQUEST, "unsupported operation").into_response();
    }
    let fields = match DirectoryFields::from_json_bytes(&body) {
        Ok(fields) => fields,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    match state.grid.put_immutable_directory(&fields).await {
        Ok(cap) => (state.mkdir_status, cap.to_string()).into_response(),
        Err(e) => grid_error(e),
    }
}

async fn get_handler(
    State(state): State<FakeGrid>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(uri) = query.get("uri") else {
        return (StatusCode::BAD_REQUEST, "missing uri").into_response();
    };
    let cap = Capability::from(uri.as_str());
    if query.get("t").map(String::as_str) == Some("json") {
        return match state.grid.get_directory(&cap).await {
            Ok(fields) => Json(fields.to_dirnode_listing()).into_response(),
            Err(e) => grid_error(e),
        };
    }
    match state.grid.get(&cap).await {
        Ok(data) => data.into_response(),
        Err(e) => grid_error(e),
    }
}

/// Route grid adapter logs to the test output; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serve `grid` over HTTP, returning the base url
pub async fn spawn_fake_grid(grid: MemoryGrid, status: FakeGridStatus) -> Url {
    init_tracing();
    let state = FakeGrid {
        grid,
        put_status: status.put,
        mkdir_status: status.mkdir,
    };
    let app = Router::new()
        .route(
            "/uri",
            get(get_handler).put(put_handler).post(post_handler),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}/", addr)).unwrap()
}

pub fn setup_author(name: &str) -> LocalAuthor {
    create_local_author(name).unwrap()
}

/// Stage `content` in `dir` and wrap it in a local snapshot
pub async fn staged_snapshot(
    dir: &Path,
    author: &LocalAuthor,
    name: &str,
    content: &[u8],
    parents_local: Vec<LocalSnapshot>,
) -> LocalSnapshot {
    let staged: PathBuf = dir.join(uuid::Uuid::new_v4().to_string());
    tokio::fs::write(&staged, content).await.unwrap();
    LocalSnapshot::new(
        name,
        author.clone(),
        Metadata::new(),
        staged,
        1_700_000_000,
        parents_local,
        vec![],
    )
}

pub fn stash_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}
