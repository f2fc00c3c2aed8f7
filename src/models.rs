use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
// request and response bodies, nothing clever

/// who uploaded a file and what they said it was
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

// metadata record stored next to every share (meta.json)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShareMeta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password_hash: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(flatten)]
    pub attribution: Attribution,
}

impl ShareMeta {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_protected(&self) -> bool {
        !self.password_hash.is_empty()
    }
}

// generic error response
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

// request to initialize a chunked upload
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitRequest {
    #[serde(alias = "filename")]
    pub file_name: String,
    #[serde(alias = "size")]
    pub file_size: i64,
    #[serde(default, alias = "expires_in")]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "content_type")]
    pub content_type: Option<String>,
}

// response for chunked upload initialization
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitResponse {
    pub upload_id: String,
    pub chunk_size: u64,
    pub total_chunks: u32,
}

// response after a chunk is stored
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub index: u32,
    pub received: u32,
    pub total_chunks: u32,
}

// progress of an in-flight upload, used by clients to resume
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusResponse {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub received: u32,
    pub missing: Vec<u32>,
    pub last_activity: DateTime<Utc>,
}

// response once a share exists (single-shot or completed chunked upload)
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ShareCreatedResponse {
    pub id: String,
    pub url: String,
    pub file_name: String,
    pub file_size: u64,
    pub expires_at: Option<DateTime<Utc>>,
}

// public metadata for a share
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ShareInfoResponse {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub password_required: bool,
}

impl From<&ShareMeta> for ShareInfoResponse {
    fn from(meta: &ShareMeta) -> Self {
        Self {
            id: meta.id.clone(),
            file_name: meta.file_name.clone(),
            file_size: meta.file_size,
            expires_at: meta.expires_at,
            password_required: meta.is_protected(),
        }
    }
}

// request to unlock a password protected share
#[derive(Deserialize, Debug)]
pub struct UnlockRequest {
    pub password: String,
}

// response for unlock / delete style operations
#[derive(Serialize, Debug)]
pub struct SuccessResponse {
    pub success: bool,
}

// admin view of a stored share
#[derive(Serialize, Debug)]
pub struct ShareSummary {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub password_protected: bool,
    #[serde(flatten)]
    pub attribution: Attribution,
}

impl From<ShareMeta> for ShareSummary {
    fn from(meta: ShareMeta) -> Self {
        let password_protected = meta.is_protected();
        Self {
            id: meta.id,
            file_name: meta.file_name,
            file_size: meta.file_size,
            created_at: meta.created_at,
            expires_at: meta.expires_at,
            password_protected,
            attribution: meta.attribution,
        }
    }
}

// response for share listing endpoint
#[derive(Serialize, Debug)]
pub struct ShareListResponse {
    pub shares: Vec<ShareSummary>,
    pub total: usize,
}

// response for share deletion endpoint
#[derive(Serialize, Debug)]
pub struct DeleteResponse {
    pub success: bool,
    pub id: String,
}

// response for server statistics endpoint
#[derive(Serialize, Debug)]
pub struct StatsResponse {
    pub total_shares: usize,
    pub total_size: u64,
    pub active_uploads: usize,
    pub data_dir: String,
}
