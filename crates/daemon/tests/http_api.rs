//! End-to-end tests for the control API of a running service

mod common;

use reqwest::StatusCode;
use url::Url;

use magic_folder_daemon::http_server::api::client::{ApiClient, ApiError};
use magic_folder_daemon::http_server::api::v1::snapshot::{
    CreateSnapshotRequest, ListAllSnapshotsRequest, ListSnapshotsRequest,
};
use magic_folder_daemon::http_server::health::liveness::LivezRequest;
use magic_folder_daemon::{start_service, ServiceState, ShutdownHandle, SnapshotSummary};

async fn start(folder: &common::TestFolder) -> (ServiceState, ShutdownHandle, ApiClient) {
    let config = common::service_config(folder, "docs", common::setup_author("alice"));
    let (state, handle) = start_service(&config).await.unwrap();
    let remote = Url::parse(&format!("http://{}", handle.api_addr())).unwrap();
    let client = ApiClient::new(&remote).unwrap();
    (state, handle, client)
}

#[tokio::test]
async fn test_livez() {
    let folder = common::TestFolder::new();
    let (_state, handle, client) = start(&folder).await;

    let response = client.call(LivezRequest {}).await.unwrap();
    assert_eq!(response.status, "ok");

    handle.shutdown();
    handle.wait().await;
}

#[tokio::test]
async fn test_create_and_list_snapshots() {
    let folder = common::TestFolder::new();
    let (state, handle, client) = start(&folder).await;
    folder.write("notes/today.md", b"# today");

    let url = client.base_url().join("/v1/snapshot/docs").unwrap();
    let response = reqwest::Client::new()
        .post(url)
        .query(&[("path", "notes/today.md")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["identifier"].is_string());

    let created = client
        .call(CreateSnapshotRequest {
            folder: "docs".to_string(),
            path: "notes/today.md".to_string(),
        })
        .await
        .unwrap();

    let folder_state = state.folder("docs").unwrap();
    let listing = client
        .call(ListSnapshotsRequest {
            folder: "docs".to_string(),
        })
        .await
        .unwrap();
    let history = listing.get("notes/today.md").unwrap();
    assert!(!history.is_empty());
    let all = client.call(ListAllSnapshotsRequest {}).await.unwrap();
    assert!(all.contains_key("docs"));

    // the background uploader eventually turns the chain into a remote head
    let mut uploaded = false;
    for _ in 0..200 {
        let head = folder_state
            .database()
            .get_remote_snapshot("notes/today.md")
            .await
            .unwrap();
        if head.is_some() {
            uploaded = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(uploaded, "upload never completed");
    let listing = client
        .call(ListSnapshotsRequest {
            folder: "docs".to_string(),
        })
        .await
        .unwrap();
    let history = listing.get("notes/today.md").unwrap();
    match history.last().unwrap() {
        SnapshotSummary::Remote { author, .. } => assert_eq!(author, "alice"),
        other => panic!("expected a remote head, got {other:?}"),
    }
    assert!(created.identifier != uuid::Uuid::nil());

    handle.shutdown();
    handle.wait().await;
}

#[tokio::test]
async fn test_local_summary_shape() {
    let folder = common::TestFolder::new();
    let (state, handle, client) = start(&folder).await;
    folder.write("a.txt", b"a");

    // capture directly so no upload races the listing
    let snapshot = state
        .folder("docs")
        .unwrap()
        .capture()
        .creator()
        .create("a.txt", &folder.root.join("a.txt"))
        .await
        .unwrap();

    let url = client.base_url().join("/v1/snapshot/docs").unwrap();
    let body: serde_json::Value = reqwest::get(url).await.unwrap().json().await.unwrap();
    let entry = &body["a.txt"][0];
    assert_eq!(entry["type"], "local");
    assert_eq!(entry["identifier"], snapshot.identifier.to_string());
    assert_eq!(entry["author"], "alice");
    assert_eq!(entry["parents"], serde_json::json!([]));
    assert!(entry["content-path"].is_string());

    handle.shutdown();
    handle.wait().await;
}

#[tokio::test]
async fn test_error_responses() {
    let folder = common::TestFolder::new();
    let (_state, handle, client) = start(&folder).await;
    std::fs::create_dir_all(folder.root.join("subdir")).unwrap();

    let err = client
        .call(CreateSnapshotRequest {
            folder: "docs".to_string(),
            path: "subdir".to_string(),
        })
        .await
        .unwrap_err();
    match err {
        ApiError::HttpStatus(status, body) => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let body: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert!(body["reason"].as_str().unwrap().contains("subdir"));
        }
        other => panic!("expected a 400, got {other:?}"),
    }

    let err = client
        .call(CreateSnapshotRequest {
            folder: "nope".to_string(),
            path: "a.txt".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::HttpStatus(StatusCode::NOT_FOUND, _)));

    let err = client
        .call(ListSnapshotsRequest {
            folder: "nope".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::HttpStatus(StatusCode::NOT_FOUND, _)));

    handle.shutdown();
    handle.wait().await;
}
