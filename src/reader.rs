//! Sequential reader over a session's chunk files.

use axum::body::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::{ReaderStream, StreamReader};

use crate::error::MissingChunk;

// read buffer per open chunk
const READ_CAPACITY: usize = 64 * 1024;

/// forward-only byte stream over chunk files in index order
///
/// Chunk `n + 1` is only opened after chunk `n` hit end-of-file, and chunk `n`
/// is closed before that happens. A chunk file that has gone missing fails the
/// read with a [`MissingChunk`] error instead of ending the stream early.
pub struct ChunkReader {
    inner: StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>,
}

impl ChunkReader {
    /// `paths` must be ordered by chunk index, starting at 0
    pub fn new(paths: Vec<PathBuf>) -> Self {
        let chunks = stream::iter(paths.into_iter().enumerate())
            .then(|(index, path)| open_chunk(index as u32, path))
            .try_flatten()
            .boxed();

        Self {
            inner: StreamReader::new(chunks),
        }
    }
}

async fn open_chunk(index: u32, path: PathBuf) -> io::Result<ReaderStream<File>> {
    match File::open(&path).await {
        Ok(file) => {
            tracing::trace!("Reading chunk: {:?}", path);
            Ok(ReaderStream::with_capacity(file, READ_CAPACITY))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::error!("Chunk {} missing at {:?}", index, path);
            Err(io::Error::new(ErrorKind::NotFound, MissingChunk { index }))
        }
        Err(e) => Err(e),
    }
}

impl AsyncRead for ChunkReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}
