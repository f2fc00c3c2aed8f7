use axum::{
    body::Body,
    extract::{ConnectInfo, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use futures_util::TryStreamExt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::fs;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::coordinator::complete_upload;
use crate::error::{error_response, DropError};
use crate::expiry::ExpiryPolicy;
use crate::models::{
    Attribution, ChunkResponse, DeleteResponse, ErrorResponse, ShareCreatedResponse,
    ShareInfoResponse, ShareListResponse, ShareMeta, ShareSummary, StatsResponse,
    SuccessResponse, UnlockRequest, UploadInitRequest, UploadInitResponse, UploadStatusResponse,
};
use crate::state::AppState;
use crate::storage::NewShare;
use crate::upload::SessionRequest;
use crate::utils::{client_ip, sanitize_filename};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn unauthorized(message: &str) -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
}

fn unlock_cookie_name(share_id: &str) -> String {
    format!("unlock_{}", share_id)
}

fn share_url(state: &AppState, id: &str) -> String {
    format!("{}/s/{}", state.config.base_url, id)
}

fn attribution(headers: &HeaderMap, peer: Option<SocketAddr>, content_type: Option<String>) -> Attribution {
    Attribution {
        uploader_ip: client_ip(headers, peer),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
        content_type: content_type.filter(|c| !c.trim().is_empty()),
    }
}

// argon2 is deliberately slow, keep it off the async workers
async fn hash_password(state: &AppState, password: Option<String>) -> Result<String, DropError> {
    let Some(password) = password.filter(|p| !p.is_empty()) else {
        return Ok(String::new());
    };
    let auth = Arc::clone(&state.auth);
    tokio::task::spawn_blocking(move || auth.hash_password(&password))
        .await
        .map_err(|e| DropError::PasswordHash(e.to_string()))?
}

async fn verify_password(state: &AppState, password: String, hash: String) -> bool {
    let auth = Arc::clone(&state.auth);
    tokio::task::spawn_blocking(move || auth.verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

// shares past their expiry stay invisible even before the sweeper gets to them
async fn load_live_share(state: &AppState, id: &str) -> Result<ShareMeta, DropError> {
    let meta = state.shares.get_share(id).await?;
    if meta.is_expired(chrono::Utc::now()) {
        tracing::debug!(share_id = %id, "Share has expired");
        return Err(DropError::NotFound);
    }
    Ok(meta)
}

// upload a whole file in one multipart request
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ShareCreatedResponse>, ApiError> {
    tracing::debug!("Processing file upload request");

    let mut password = None;
    let mut expires_in = None;
    let mut created: Option<ShareMeta> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        bad_request(format!("Failed to read multipart field: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(meta) = &created {
            // options have to arrive before the file; the share is already written
            if name == "password" || name == "expires_in" {
                tracing::warn!("Form field {} sent after the file, rejecting upload", name);
                if let Err(e) = state.shares.delete_share(&meta.id).await {
                    tracing::warn!(share_id = %meta.id, "Failed to remove rejected share: {}", e);
                }
                return Err(bad_request(format!("Field '{}' must be sent before the file", name)));
            }
            continue;
        }

        match name.as_str() {
            "password" => {
                password = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?);
            }
            "expires_in" => {
                expires_in = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?);
            }
            "file" => {
                let file_name = field.file_name().ok_or_else(|| {
                    tracing::warn!("Upload request missing filename");
                    bad_request("No filename provided".to_string())
                })?;
                let file_name = sanitize_filename(file_name);
                let content_type = field.content_type().map(|c| c.to_string());
                tracing::debug!("Receiving file: {}", file_name);

                let policy = ExpiryPolicy::parse_opt(expires_in.as_deref()).map_err(error_response)?;
                let password_hash = hash_password(&state, password.take())
                    .await
                    .map_err(error_response)?;

                let new_share = NewShare {
                    file_name,
                    declared_size: None,
                    expires_at: policy.resolve(chrono::Utc::now(), state.config.default_expiry),
                    password_hash,
                    attribution: attribution(&headers, peer.as_ref().map(|c| c.0), content_type),
                };

                let stream = field.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()));
                let mut reader = StreamReader::new(Box::pin(stream));
                let meta = state
                    .shares
                    .create_share(&mut reader, new_share)
                    .await
                    .map_err(error_response)?;
                created = Some(meta);
            }
            other => {
                tracing::trace!("Ignoring form field: {}", other);
            }
        }
    }

    let meta = created.ok_or_else(|| {
        tracing::warn!("Upload request contained no file field");
        bad_request("No file provided".to_string())
    })?;

    tracing::info!("✅ Uploaded file: {} ({} bytes)", meta.file_name, meta.file_size);

    Ok(Json(ShareCreatedResponse {
        url: share_url(&state, &meta.id),
        id: meta.id,
        file_name: meta.file_name,
        file_size: meta.file_size,
        expires_at: meta.expires_at,
    }))
}

// initialize a chunked upload
pub async fn init_upload(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<UploadInitRequest>,
) -> Result<Json<UploadInitResponse>, ApiError> {
    tracing::debug!("Initializing chunked upload for file: {}", payload.file_name);

    if payload.file_size > state.config.max_upload_size as i64 {
        tracing::warn!("Rejected upload of {} bytes (limit {})", payload.file_size, state.config.max_upload_size);
        return Err(error_response(DropError::Validation(format!(
            "file size exceeds limit of {} bytes",
            state.config.max_upload_size
        ))));
    }

    let expires_in = ExpiryPolicy::parse_opt(payload.expires_in.as_deref()).map_err(error_response)?;
    let password_hash = hash_password(&state, payload.password).await.map_err(error_response)?;

    let request = SessionRequest {
        file_name: sanitize_filename(&payload.file_name),
        declared_size: payload.file_size,
        expires_in,
        password_hash,
        attribution: attribution(&headers, peer.map(|c| c.0), payload.content_type),
    };

    let session = state
        .uploads
        .init_session(request)
        .await
        .map_err(error_response)?;

    Ok(Json(UploadInitResponse {
        upload_id: session.id.clone(),
        chunk_size: session.chunk_size,
        total_chunks: session.total_chunks,
    }))
}

// upload a single chunk as the raw request body
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    Path((upload_id, index)): Path<(String, i64)>,
    body: Body,
) -> Result<Json<ChunkResponse>, ApiError> {
    tracing::trace!("Received chunk {} for upload {}", index, upload_id);

    let stream = body
        .into_data_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()));
    let mut reader = StreamReader::new(Box::pin(stream));

    let received = state
        .uploads
        .receive_chunk(&upload_id, index, &mut reader)
        .await
        .map_err(error_response)?;

    let total_chunks = state
        .uploads
        .get_session(&upload_id)
        .map(|s| s.total_chunks)
        .unwrap_or(received);

    Ok(Json(ChunkResponse {
        index: index as u32,
        received,
        total_chunks,
    }))
}

// progress of an upload, so clients can resume
pub async fn upload_status(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadStatusResponse>, ApiError> {
    let session = state
        .uploads
        .get_session(&upload_id)
        .ok_or_else(|| error_response(DropError::NotFound))?;

    Ok(Json(UploadStatusResponse {
        id: session.id.clone(),
        file_name: session.file_name.clone(),
        file_size: session.declared_size,
        chunk_size: session.chunk_size,
        total_chunks: session.total_chunks,
        received: session.received_count(),
        missing: session.missing_chunks(),
        last_activity: session.last_activity(),
    }))
}

// abandon an upload
pub async fn abort_upload(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .uploads
        .discard(&upload_id)
        .await
        .map_err(error_response)?;
    tracing::info!(upload_id = %upload_id, "Upload aborted by client");
    Ok(Json(SuccessResponse { success: true }))
}

// complete a chunked upload by assembling all chunks into a share
pub async fn complete_chunked_upload(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<Json<ShareCreatedResponse>, ApiError> {
    tracing::debug!("Completing chunked upload: {}", upload_id);

    let meta = complete_upload(
        &state.uploads,
        &state.shares,
        &upload_id,
        state.config.default_expiry,
    )
    .await
    .map_err(error_response)?;

    Ok(Json(ShareCreatedResponse {
        url: share_url(&state, &meta.id),
        id: meta.id,
        file_name: meta.file_name,
        file_size: meta.file_size,
        expires_at: meta.expires_at,
    }))
}

// public metadata for a share
pub async fn share_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ShareInfoResponse>, ApiError> {
    let meta = load_live_share(&state, &id).await.map_err(error_response)?;
    Ok(Json(ShareInfoResponse::from(&meta)))
}

// check a share password and hand out an unlock cookie
pub async fn unlock_share(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    jar: CookieJar,
    Json(payload): Json<UnlockRequest>,
) -> Result<(CookieJar, Json<SuccessResponse>), ApiError> {
    let meta = load_live_share(&state, &id).await.map_err(error_response)?;

    if !meta.is_protected() || !verify_password(&state, payload.password, meta.password_hash.clone()).await {
        tracing::warn!(share_id = %id, "🚫 Invalid unlock attempt");
        return Err(unauthorized("Invalid password"));
    }

    let token = state.auth.issue_unlock_token(&id);
    let cookie = Cookie::build((unlock_cookie_name(&id), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    tracing::debug!(share_id = %id, "Share unlocked");
    Ok((jar.add(cookie), Json(SuccessResponse { success: true })))
}

// stream a share's file to the client
pub async fn download_share(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let meta = load_live_share(&state, &id).await.map_err(error_response)?;

    if meta.is_protected() {
        let unlocked = jar
            .get(&unlock_cookie_name(&id))
            .is_some_and(|c| state.auth.validate_unlock_token(&id, c.value()));
        if !unlocked {
            return Err(unauthorized("Password required"));
        }
    }

    let path = state.shares.file_path(&meta);
    let file = fs::File::open(&path).await.map_err(|e| {
        tracing::error!("Failed to open share file {:?}: {}", path, e);
        error_response(DropError::from(e))
    })?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", meta.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    tracing::debug!(share_id = %id, bytes = meta.file_size, "Serving download");

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(meta.file_size)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

// short share link
pub async fn share_link(Path(id): Path<String>) -> Redirect {
    Redirect::to(&format!("/api/share/{}/download", sanitize_filename(&id)))
}

// list every stored share
pub async fn list_shares(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ShareListResponse>, ApiError> {
    tracing::debug!("Listing shares in {:?}", state.shares.shares_dir());
    let shares: Vec<ShareSummary> = state
        .shares
        .list_shares()
        .await
        .map_err(error_response)?
        .into_iter()
        .map(ShareSummary::from)
        .collect();

    let total = shares.len();
    tracing::debug!("Found {} shares total", total);
    Ok(Json(ShareListResponse { shares, total }))
}

// delete a specific share
pub async fn delete_share(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    tracing::debug!("Request to delete share: {}", id);
    state.shares.delete_share(&id).await.map_err(|e| {
        if matches!(e, DropError::NotFound) {
            tracing::warn!("Share not found for deletion: {}", id);
        }
        error_response(e)
    })?;

    Ok(Json(DeleteResponse { success: true, id }))
}

// get server statistics
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    tracing::debug!("Calculating server statistics");
    let shares = state.shares.list_shares().await.map_err(error_response)?;
    let total_size: u64 = shares.iter().map(|s| s.file_size).sum();

    Ok(Json(StatsResponse {
        total_shares: shares.len(),
        total_size,
        active_uploads: state.uploads.active_sessions(),
        data_dir: state
            .config
            .data_dir
            .canonicalize()
            .unwrap_or_else(|_| state.config.data_dir.clone())
            .to_string_lossy()
            .to_string(),
    }))
}

// health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "juicebox-drop",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
