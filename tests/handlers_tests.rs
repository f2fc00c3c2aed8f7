use juicebox_drop::handlers::{
    abort_upload, complete_chunked_upload, delete_share, get_stats, health_check, init_upload,
    list_shares, share_info, upload_status,
};
use juicebox_drop::config::Config;
use juicebox_drop::state::AppState;
use juicebox_drop::models::UploadInitRequest;
use juicebox_drop::storage::NewShare;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;

fn test_state(chunk_size: u64) -> (TempDir, Arc<AppState>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: temp_dir.path().to_path_buf(),
        chunk_size,
        max_upload_size: 1024,
        ..Config::default()
    };
    let state = Arc::new(AppState::new(config).unwrap());
    (temp_dir, state)
}

fn init_request(file_name: &str, file_size: i64) -> UploadInitRequest {
    UploadInitRequest {
        file_name: file_name.to_string(),
        file_size,
        expires_in: None,
        password: None,
        content_type: None,
    }
}

async fn store_share(state: &AppState, name: &str, bytes: &[u8], expires_at: Option<chrono::DateTime<Utc>>) -> String {
    let mut reader = bytes;
    state
        .shares
        .create_share(
            &mut reader,
            NewShare {
                file_name: name.to_string(),
                expires_at,
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_health_check() {
    let response = health_check().await;
    assert_eq!(response.0["status"], "healthy");
    assert_eq!(response.0["service"], "juicebox-drop");
}

#[tokio::test]
async fn test_init_upload() {
    let (_temp_dir, state) = test_state(4);

    let response = init_upload(State(state.clone()), None, HeaderMap::new(), Json(init_request("a.txt", 10)))
        .await
        .unwrap();
    assert_eq!(response.0.chunk_size, 4);
    assert_eq!(response.0.total_chunks, 3);
    assert!(state.uploads.get_session(&response.0.upload_id).is_some());

    // too large
    let result = init_upload(State(state.clone()), None, HeaderMap::new(), Json(init_request("big.bin", 4096))).await;
    assert_eq!(result.err().unwrap().0, StatusCode::BAD_REQUEST);

    // negative
    let result = init_upload(State(state.clone()), None, HeaderMap::new(), Json(init_request("neg.bin", -5))).await;
    assert_eq!(result.err().unwrap().0, StatusCode::BAD_REQUEST);

    // unparseable expiry
    let mut request = init_request("a.txt", 10);
    request.expires_in = Some("whenever".to_string());
    let result = init_upload(State(state.clone()), None, HeaderMap::new(), Json(request)).await;
    assert_eq!(result.err().unwrap().0, StatusCode::BAD_REQUEST);

    // more days than a timestamp can hold
    let mut request = init_request("a.txt", 10);
    request.expires_in = Some("4294967295".to_string());
    let result = init_upload(State(state.clone()), None, HeaderMap::new(), Json(request)).await;
    assert_eq!(result.err().unwrap().0, StatusCode::BAD_REQUEST);

    assert_eq!(state.uploads.active_sessions(), 1);
}

#[tokio::test]
async fn test_init_upload_records_attribution() {
    let (_temp_dir, state) = test_state(4);
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
    headers.insert("user-agent", "uploader/1.0".parse().unwrap());

    let mut request = init_request("a.txt", 3);
    request.content_type = Some("text/plain".to_string());
    let response = init_upload(State(state.clone()), None, headers, Json(request))
        .await
        .unwrap();

    let session = state.uploads.get_session(&response.0.upload_id).unwrap();
    assert_eq!(session.attribution.uploader_ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(session.attribution.user_agent.as_deref(), Some("uploader/1.0"));
    assert_eq!(session.attribution.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_upload_status_and_abort() {
    let (_temp_dir, state) = test_state(4);
    let response = init_upload(State(state.clone()), None, HeaderMap::new(), Json(init_request("a.txt", 8)))
        .await
        .unwrap();
    let upload_id = response.0.upload_id.clone();

    let mut reader: &[u8] = b"BBBB";
    state.uploads.receive_chunk(&upload_id, 1, &mut reader).await.unwrap();

    let status = upload_status(State(state.clone()), Path(upload_id.clone())).await.unwrap();
    assert_eq!(status.0.received, 1);
    assert_eq!(status.0.missing, vec![0]);
    assert_eq!(status.0.total_chunks, 2);

    let aborted = abort_upload(State(state.clone()), Path(upload_id.clone())).await.unwrap();
    assert!(aborted.0.success);

    let result = upload_status(State(state.clone()), Path(upload_id.clone())).await;
    assert_eq!(result.err().unwrap().0, StatusCode::NOT_FOUND);

    // aborting twice is fine
    assert!(abort_upload(State(state.clone()), Path(upload_id)).await.is_ok());
}

#[tokio::test]
async fn test_complete_chunked_upload() {
    let (_temp_dir, state) = test_state(4);
    let response = init_upload(State(state.clone()), None, HeaderMap::new(), Json(init_request("notes.txt", 6)))
        .await
        .unwrap();
    let upload_id = response.0.upload_id.clone();

    let mut reader: &[u8] = b"abcd";
    state.uploads.receive_chunk(&upload_id, 0, &mut reader).await.unwrap();

    // not everything is there yet
    let result = complete_chunked_upload(State(state.clone()), Path(upload_id.clone())).await;
    let (status, body) = result.err().unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.0.error.contains("1/2"));

    let mut reader: &[u8] = b"ef";
    state.uploads.receive_chunk(&upload_id, 1, &mut reader).await.unwrap();

    let created = complete_chunked_upload(State(state.clone()), Path(upload_id.clone()))
        .await
        .unwrap();
    assert_eq!(created.0.file_name, "notes.txt");
    assert_eq!(created.0.file_size, 6);
    assert_eq!(created.0.url, format!("{}/s/{}", state.config.base_url, created.0.id));
    // default expiry of 30 days applies
    assert!(created.0.expires_at.unwrap() > Utc::now() + Duration::days(29));

    let result = complete_chunked_upload(State(state.clone()), Path(upload_id)).await;
    assert_eq!(result.err().unwrap().0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_share_info_hides_expired() {
    let (_temp_dir, state) = test_state(4);
    let live = store_share(&state, "live.txt", b"live", None).await;
    let expired = store_share(&state, "old.txt", b"old", Some(Utc::now() - Duration::minutes(1))).await;

    let info = share_info(State(state.clone()), Path(live.clone())).await.unwrap();
    assert_eq!(info.0.file_name, "live.txt");
    assert_eq!(info.0.file_size, 4);
    assert!(!info.0.password_required);

    let result = share_info(State(state.clone()), Path(expired)).await;
    assert_eq!(result.err().unwrap().0, StatusCode::NOT_FOUND);

    let result = share_info(State(state.clone()), Path("Missing1".to_string())).await;
    assert_eq!(result.err().unwrap().0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_shares() {
    let (_temp_dir, state) = test_state(4);

    // Empty store
    let response = list_shares(State(state.clone())).await.unwrap();
    assert_eq!(response.0.shares.len(), 0);
    assert_eq!(response.0.total, 0);

    let id = store_share(&state, "test.txt", b"hello world", None).await;

    let response = list_shares(State(state.clone())).await.unwrap();
    assert_eq!(response.0.total, 1);
    assert_eq!(response.0.shares[0].id, id);
    assert_eq!(response.0.shares[0].file_name, "test.txt");
    assert!(!response.0.shares[0].password_protected);
}

#[tokio::test]
async fn test_delete_share() {
    let (_temp_dir, state) = test_state(4);
    let id = store_share(&state, "delete_me.txt", b"bye", None).await;

    let response = delete_share(State(state.clone()), Path(id.clone())).await.unwrap();
    assert!(response.0.success);
    assert_eq!(response.0.id, id);
    assert!(state.shares.get_share(&id).await.is_err());

    // Delete non-existent
    let result = delete_share(State(state.clone()), Path(id)).await;
    assert_eq!(result.err().unwrap().0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_stats() {
    let (_temp_dir, state) = test_state(4);
    store_share(&state, "file1.txt", b"12345", None).await;
    store_share(&state, "file2.txt", b"1234567890", None).await;
    init_upload(State(state.clone()), None, HeaderMap::new(), Json(init_request("pending.bin", 4)))
        .await
        .unwrap();

    let response = get_stats(State(state.clone())).await.unwrap();
    assert_eq!(response.0.total_shares, 2);
    assert_eq!(response.0.total_size, 15);
    assert_eq!(response.0.active_uploads, 1);
}
