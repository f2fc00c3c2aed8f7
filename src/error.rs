use axum::http::StatusCode;
use axum::Json;

use crate::models::ErrorResponse;

/// errors produced by the upload core and the share store
#[derive(Debug, thiserror::Error)]
pub enum DropError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("chunk index {index} out of range (0..{total})")]
    InvalidIndex { index: i64, total: u32 },

    #[error("upload incomplete: received {received}/{total} chunks")]
    Incomplete { received: u32, total: u32 },

    #[error("chunk {index} is missing from storage")]
    StorageCorruption { index: u32 },

    #[error("io error: {0}")]
    Io(std::io::Error),

    #[error("metadata error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

/// raised by the chunk reader when a chunk the mask claims is present can't be opened
#[derive(Debug, thiserror::Error)]
#[error("chunk {index} is missing")]
pub struct MissingChunk {
    pub index: u32,
}

impl From<std::io::Error> for DropError {
    fn from(err: std::io::Error) -> Self {
        // the chunk reader tunnels missing chunks through io::Error so tokio::io::copy can carry them
        if let Some(missing) = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MissingChunk>())
        {
            return DropError::StorageCorruption {
                index: missing.index,
            };
        }
        DropError::Io(err)
    }
}

impl DropError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DropError::Validation(_)
            | DropError::InvalidIndex { .. }
            | DropError::Incomplete { .. } => StatusCode::BAD_REQUEST,
            DropError::NotFound => StatusCode::NOT_FOUND,
            DropError::StorageCorruption { .. }
            | DropError::Io(_)
            | DropError::Serialization(_)
            | DropError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// translate a core error into the json error shape the handlers return
pub fn error_response(err: DropError) -> (StatusCode, Json<ErrorResponse>) {
    let status = err.status_code();
    // don't leak filesystem details to clients
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Internal error: {}", err);
        "Internal server error".to_string()
    } else {
        err.to_string()
    };
    (status, Json(ErrorResponse { error: message }))
}
