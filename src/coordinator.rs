use chrono::Utc;

use crate::error::DropError;
use crate::models::ShareMeta;
use crate::storage::{NewShare, ShareStore};
use crate::upload::UploadManager;

/// turn a fully uploaded session into a share
///
/// Runs check → assemble → create share → discard. An incomplete session is
/// left untouched so the client can keep uploading; a session whose chunks
/// turn out to be missing on disk is discarded since it can never complete.
/// The expiry policy is resolved here against `default_expiry` as it is now,
/// not as it was when the session started.
pub async fn complete_upload(
    uploads: &UploadManager,
    shares: &ShareStore,
    upload_id: &str,
    default_expiry: Option<chrono::Duration>,
) -> Result<ShareMeta, DropError> {
    let session = uploads.get_session(upload_id).ok_or(DropError::NotFound)?;
    let mut reader = uploads.assemble(upload_id)?;

    let new_share = NewShare {
        file_name: session.file_name.clone(),
        declared_size: Some(session.declared_size),
        expires_at: session.expires_in.resolve(Utc::now(), default_expiry),
        password_hash: session.password_hash.clone(),
        attribution: session.attribution.clone(),
    };

    let result = shares.create_share(&mut reader, new_share).await;
    drop(reader);

    match result {
        Ok(meta) => {
            if let Err(e) = uploads.discard(upload_id).await {
                tracing::warn!(upload_id = %upload_id, "Share created but scratch cleanup failed: {}", e);
            }
            tracing::info!(
                upload_id = %upload_id,
                share_id = %meta.id,
                bytes = meta.file_size,
                "✅ Completed chunked upload"
            );
            Ok(meta)
        }
        Err(err @ DropError::StorageCorruption { .. }) => {
            tracing::error!(upload_id = %upload_id, "Upload is unrecoverable: {}", err);
            if let Err(e) = uploads.discard(upload_id).await {
                tracing::warn!(upload_id = %upload_id, "Failed to discard corrupt upload: {}", e);
            }
            Err(err)
        }
        Err(err) => Err(err),
    }
}
