//! In-progress chunked uploads.
//!
//! Each session lives in memory (mask, activity time, attribution) and owns a
//! scratch directory `<data_dir>/uploads/<id>/` holding one file per chunk,
//! named `chunk_00000`, `chunk_00001`, ... Chunk bytes are written without
//! holding any lock; only the mask and activity timestamp sit behind the
//! per-session mutex.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::DropError;
use crate::expiry::ExpiryPolicy;
use crate::id::{generate_id, is_valid_id};
use crate::models::Attribution;
use crate::reader::ChunkReader;

// retries when a freshly generated id is already taken
const MAX_ID_ATTEMPTS: usize = 8;

/// number of chunks needed for `declared_size` bytes; never less than one
pub fn total_chunks_for(declared_size: u64, chunk_size: u64) -> u32 {
    let chunks = declared_size.div_ceil(chunk_size.max(1)).max(1);
    u32::try_from(chunks).unwrap_or(u32::MAX)
}

/// file name of a chunk inside the session directory
pub fn chunk_file_name(index: u32) -> String {
    format!("chunk_{:05}", index)
}

/// outcome of a stale-session sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StaleSweep {
    pub discarded: usize,
    pub failed: usize,
}

/// what the client told us when starting an upload
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub file_name: String,
    pub declared_size: i64,
    pub expires_in: ExpiryPolicy,
    /// already hashed by the authenticator; empty means unprotected
    pub password_hash: String,
    pub attribution: Attribution,
}

#[derive(Debug)]
struct Progress {
    received: Vec<bool>,
    last_activity: DateTime<Utc>,
    // set once the session is expunged so late chunk writes can't record anything
    discarded: bool,
}

/// one client's in-progress upload
#[derive(Debug)]
pub struct UploadSession {
    pub id: String,
    pub file_name: String,
    pub declared_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub expires_in: ExpiryPolicy,
    pub password_hash: String,
    pub attribution: Attribution,
    pub created_at: DateTime<Utc>,
    dir: PathBuf,
    progress: Mutex<Progress>,
}

impl UploadSession {
    fn progress(&self) -> MutexGuard<'_, Progress> {
        // a panic while holding the lock can't leave the mask half-updated
        self.progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// scratch directory holding this session's chunks
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chunk_path(&self, index: u32) -> PathBuf {
        self.dir.join(chunk_file_name(index))
    }

    pub fn received_count(&self) -> u32 {
        self.progress().received.iter().filter(|r| **r).count() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.progress().received.iter().all(|r| *r)
    }

    pub fn is_received(&self, index: u32) -> bool {
        self.progress()
            .received
            .get(index as usize)
            .copied()
            .unwrap_or(false)
    }

    /// indices still waiting for data, ascending
    pub fn missing_chunks(&self) -> Vec<u32> {
        self.progress()
            .received
            .iter()
            .enumerate()
            .filter(|(_, r)| !**r)
            .map(|(i, _)| i as u32)
            .collect()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.progress().last_activity
    }

    fn is_discarded(&self) -> bool {
        self.progress().discarded
    }
}

/// tracks every in-progress chunked upload
#[derive(Debug)]
pub struct UploadManager {
    uploads_dir: PathBuf,
    chunk_size: u64,
    sessions: DashMap<String, Arc<UploadSession>>,
}

impl UploadManager {
    /// create the manager, making sure `<data_dir>/uploads` exists
    ///
    /// Sessions are memory-only, so scratch directories left behind by a
    /// previous process are removed here.
    pub fn new(data_dir: &Path, chunk_size: u64) -> std::io::Result<Self> {
        if chunk_size == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "chunk size must be positive",
            ));
        }
        let uploads_dir = data_dir.join("uploads");
        std::fs::create_dir_all(&uploads_dir)?;

        for entry in std::fs::read_dir(&uploads_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                tracing::debug!("Removing orphaned upload directory: {:?}", entry.path());
                if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                    tracing::warn!("Failed to remove orphaned upload directory {:?}: {}", entry.path(), e);
                }
            }
        }

        Ok(Self {
            uploads_dir,
            chunk_size,
            sessions: DashMap::new(),
        })
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// number of sessions currently tracked
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// start a new upload session
    ///
    /// The scratch directory is created before the session is inserted, so no
    /// other operation can observe a session without its directory.
    pub async fn init_session(&self, request: SessionRequest) -> Result<Arc<UploadSession>, DropError> {
        let declared_size = u64::try_from(request.declared_size)
            .map_err(|_| DropError::Validation("file size must not be negative".to_string()))?;

        let total_chunks = total_chunks_for(declared_size, self.chunk_size);
        let (id, dir) = self.allocate_dir().await?;
        let now = Utc::now();

        let session = Arc::new(UploadSession {
            id: id.clone(),
            file_name: request.file_name,
            declared_size,
            chunk_size: self.chunk_size,
            total_chunks,
            expires_in: request.expires_in,
            password_hash: request.password_hash,
            attribution: request.attribution,
            created_at: now,
            dir,
            progress: Mutex::new(Progress {
                received: vec![false; total_chunks as usize],
                last_activity: now,
                discarded: false,
            }),
        });

        self.sessions.insert(id.clone(), Arc::clone(&session));

        tracing::info!(
            upload_id = %id,
            file_name = %session.file_name,
            declared_size,
            total_chunks,
            expires_in = %session.expires_in,
            "📤 Initialized chunked upload"
        );
        Ok(session)
    }

    async fn allocate_dir(&self) -> Result<(String, PathBuf), DropError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate_id();
            if self.sessions.contains_key(&id) {
                continue;
            }
            let dir = self.uploads_dir.join(&id);
            match fs::create_dir(&dir).await {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("Upload id collision on {}, retrying", id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(std::io::Error::new(ErrorKind::AlreadyExists, "could not allocate a unique upload id").into())
    }

    /// look up a live session
    pub fn get_session(&self, id: &str) -> Option<Arc<UploadSession>> {
        // clone the Arc out so no map shard lock is held by the caller
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// persist one chunk and mark it received; returns the received count
    ///
    /// Bytes go to a uniquely named temp file which is renamed onto the chunk
    /// name once fully written and synced, so concurrent uploads of the same
    /// index never interleave and a failed write leaves nothing behind.
    pub async fn receive_chunk<R>(&self, id: &str, index: i64, data: &mut R) -> Result<u32, DropError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let session = self.get_session(id).ok_or(DropError::NotFound)?;

        let index = u32::try_from(index)
            .ok()
            .filter(|i| *i < session.total_chunks)
            .ok_or(DropError::InvalidIndex {
                index,
                total: session.total_chunks,
            })?;

        let final_path = session.chunk_path(index);
        let temp_path = session
            .dir
            .join(format!(".{}.{}.tmp", chunk_file_name(index), Uuid::new_v4().simple()));
        tracing::trace!("Writing chunk {} to {:?}", index, temp_path);

        let written = match write_chunk(&temp_path, &final_path, data, session.chunk_size).await {
            Ok(written) => written,
            Err(err) => {
                if let Err(e) = fs::remove_file(&temp_path).await {
                    if e.kind() != ErrorKind::NotFound {
                        tracing::warn!(upload_id = %id, index, "Failed to remove partial chunk: {}", e);
                    }
                }
                if session.is_discarded() {
                    return Err(DropError::NotFound);
                }
                tracing::warn!(upload_id = %id, index, "Failed to store chunk: {}", err);
                return Err(err);
            }
        };

        let received = {
            let mut progress = session.progress();
            if progress.discarded {
                None
            } else {
                progress.received[index as usize] = true;
                progress.last_activity = Utc::now();
                Some(progress.received.iter().filter(|r| **r).count() as u32)
            }
        };

        match received {
            Some(received) => {
                tracing::debug!(
                    upload_id = %id,
                    index,
                    bytes = written,
                    "📦 Received chunk {}/{}",
                    received,
                    session.total_chunks
                );
                Ok(received)
            }
            None => {
                // discarded while we were writing; don't leave the chunk behind
                if let Err(e) = fs::remove_file(&final_path).await {
                    if e.kind() != ErrorKind::NotFound {
                        tracing::warn!(upload_id = %id, index, "Failed to remove chunk of discarded upload: {}", e);
                    }
                }
                Err(DropError::NotFound)
            }
        }
    }

    /// chunks received so far; 0 for unknown sessions
    pub fn received_count(&self, id: &str) -> u32 {
        self.get_session(id)
            .map(|session| session.received_count())
            .unwrap_or(0)
    }

    /// true once every chunk index has been received
    pub fn is_complete(&self, id: &str) -> bool {
        self.get_session(id)
            .map(|session| session.is_complete())
            .unwrap_or(false)
    }

    /// ordered reader over a complete session's chunks
    ///
    /// Every call builds a fresh reader starting at chunk 0.
    pub fn assemble(&self, id: &str) -> Result<ChunkReader, DropError> {
        let session = self.get_session(id).ok_or(DropError::NotFound)?;

        let received = session.received_count();
        if received < session.total_chunks {
            return Err(DropError::Incomplete {
                received,
                total: session.total_chunks,
            });
        }

        tracing::debug!(upload_id = %id, chunks = session.total_chunks, "Assembling upload");
        let paths = (0..session.total_chunks)
            .map(|index| session.chunk_path(index))
            .collect();
        Ok(ChunkReader::new(paths))
    }

    /// forget a session and delete its scratch directory; safe to repeat
    pub async fn discard(&self, id: &str) -> Result<(), DropError> {
        if !is_valid_id(id) {
            return Ok(());
        }

        if let Some((_, session)) = self.sessions.remove(id) {
            session.progress().discarded = true;
            tracing::debug!(upload_id = %id, "Discarded upload session");
        }

        let dir = self.uploads_dir.join(id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                // a chunk write racing the removal can re-populate the directory once
                tracing::debug!(upload_id = %id, "Retrying scratch removal after: {}", e);
                match fs::remove_dir_all(&dir).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// discard every session idle for longer than `timeout` as of now
    pub async fn sweep_stale(&self, timeout: Duration) -> StaleSweep {
        self.sweep_stale_at(Utc::now(), timeout).await
    }

    /// discard every session whose last activity is older than `now - timeout`
    ///
    /// Failures on one session are logged and don't stop the sweep.
    pub async fn sweep_stale_at(&self, now: DateTime<Utc>, timeout: Duration) -> StaleSweep {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(timeout).unwrap_or(DateTime::<Utc>::MIN_UTC);

        // collect first: discarding while iterating would deadlock on the shard lock
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().last_activity() < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let mut outcome = StaleSweep::default();
        for id in stale {
            match self.discard(&id).await {
                Ok(()) => {
                    tracing::info!(upload_id = %id, "🧹 Discarded stale upload session");
                    outcome.discarded += 1;
                }
                Err(e) => {
                    tracing::warn!(upload_id = %id, "Failed to discard stale upload: {}", e);
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}

async fn write_chunk<R>(temp_path: &Path, final_path: &Path, data: &mut R, limit: u64) -> Result<u64, DropError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut file = fs::File::create(temp_path).await?;

    // read one byte past the limit so oversized chunks can be told apart
    let mut limited = AsyncReadExt::take(&mut *data, limit + 1);
    let written = tokio::io::copy(&mut limited, &mut file).await?;
    if written > limit {
        return Err(DropError::Validation(format!(
            "chunk exceeds chunk size of {} bytes",
            limit
        )));
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(temp_path, final_path).await?;
    Ok(written)
}
