use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::DropError;
use crate::id::{generate_id, is_valid_id};
use crate::models::{Attribution, ShareMeta};
use crate::utils::sanitize_filename;

/// name of the metadata record inside each share directory
pub const META_FILE: &str = "meta.json";

// retries when a freshly generated id is already taken
const MAX_ID_ATTEMPTS: usize = 8;

/// everything the store needs to know about a share besides its bytes
#[derive(Debug, Clone, Default)]
pub struct NewShare {
    pub file_name: String,
    /// size the client claimed; the stored size is whatever was actually written
    pub declared_size: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub password_hash: String,
    pub attribution: Attribution,
}

/// disk-backed share store: `<data_dir>/shares/<id>/{meta.json,<file>}`
#[derive(Debug, Clone)]
pub struct ShareStore {
    shares_dir: PathBuf,
}

impl ShareStore {
    /// open the store, creating the shares directory if needed
    pub fn new(data_dir: &Path) -> std::io::Result<Self> {
        let shares_dir = data_dir.join("shares");
        std::fs::create_dir_all(&shares_dir)?;
        Ok(Self { shares_dir })
    }

    pub fn shares_dir(&self) -> &Path {
        &self.shares_dir
    }

    fn share_dir(&self, id: &str) -> PathBuf {
        self.shares_dir.join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.share_dir(id).join(META_FILE)
    }

    /// path of the stored file for a share
    pub fn file_path(&self, meta: &ShareMeta) -> PathBuf {
        self.share_dir(&meta.id).join(&meta.file_name)
    }

    /// copy `reader` into a new share and write its metadata
    ///
    /// On any failure the share directory is removed again, so a half-written
    /// share never becomes visible.
    pub async fn create_share<R>(&self, reader: &mut R, new: NewShare) -> Result<ShareMeta, DropError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let (id, dir) = self.allocate_dir().await?;
        tracing::trace!("Allocated share directory: {:?}", dir);

        match self.write_share(&id, &dir, reader, new).await {
            Ok(meta) => {
                tracing::info!(
                    share_id = %meta.id,
                    file_name = %meta.file_name,
                    bytes = meta.file_size,
                    "✅ Created share"
                );
                Ok(meta)
            }
            Err(err) => {
                tracing::error!(share_id = %id, "Failed to create share: {}", err);
                if let Err(e) = fs::remove_dir_all(&dir).await {
                    tracing::warn!(share_id = %id, "Failed to remove partial share: {}", e);
                }
                Err(err)
            }
        }
    }

    async fn allocate_dir(&self) -> Result<(String, PathBuf), DropError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate_id();
            let dir = self.share_dir(&id);
            match fs::create_dir(&dir).await {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("Share id collision on {}, retrying", id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(std::io::Error::new(ErrorKind::AlreadyExists, "could not allocate a unique share id").into())
    }

    async fn write_share<R>(
        &self,
        id: &str,
        dir: &Path,
        reader: &mut R,
        new: NewShare,
    ) -> Result<ShareMeta, DropError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let file_name = stored_file_name(&sanitize_filename(&new.file_name));
        let mut file = fs::File::create(dir.join(&file_name)).await?;
        let written = tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;

        if let Some(declared) = new.declared_size {
            if declared != written {
                tracing::debug!(
                    share_id = %id,
                    declared,
                    written,
                    "Share size differs from declared size"
                );
            }
        }

        let meta = ShareMeta {
            id: id.to_string(),
            created_at: Utc::now(),
            expires_at: new.expires_at,
            password_hash: new.password_hash,
            file_name,
            file_size: written,
            attribution: new.attribution,
        };

        let data = serde_json::to_vec_pretty(&meta)?;
        fs::write(self.meta_path(id), data).await?;

        Ok(meta)
    }

    /// load a share's metadata
    pub async fn get_share(&self, id: &str) -> Result<ShareMeta, DropError> {
        if !is_valid_id(id) {
            return Err(DropError::NotFound);
        }
        let data = match fs::read(self.meta_path(id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(DropError::NotFound),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    /// remove a share and everything in its directory
    pub async fn delete_share(&self, id: &str) -> Result<(), DropError> {
        if !is_valid_id(id) {
            return Err(DropError::NotFound);
        }
        match fs::remove_dir_all(self.share_dir(id)).await {
            Ok(()) => {
                tracing::info!(share_id = %id, "🗑️  Deleted share");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(DropError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// every readable share, newest first; unreadable entries are skipped
    pub async fn list_shares(&self) -> Result<Vec<ShareMeta>, DropError> {
        let mut shares = Vec::new();
        let mut entries = fs::read_dir(&self.shares_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_valid_id(&name) || !entry.file_type().await?.is_dir() {
                continue;
            }
            match self.get_share(&name).await {
                Ok(meta) => shares.push(meta),
                // a share still being written has no meta.json yet
                Err(DropError::NotFound) => {}
                Err(e) => tracing::warn!(share_id = %name, "Skipping unreadable share: {}", e),
            }
        }

        shares.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(shares)
    }

    /// shares whose expiry is at or before `now`
    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<ShareMeta>, DropError> {
        Ok(self
            .list_shares()
            .await?
            .into_iter()
            .filter(|meta| meta.is_expired(now))
            .collect())
    }
}

// the metadata record owns meta.json, so an upload with that name is renamed
fn stored_file_name(name: &str) -> String {
    if name == META_FILE {
        format!("_{}", name)
    } else {
        name.to_string()
    }
}
