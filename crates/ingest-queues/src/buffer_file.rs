//! Append-only disk buffer used to survive an outage: items that fail to
//! upload are framed and appended here; the next successful flush drains
//! and retries the whole file.

use ingest_core::IngestError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

type Encode<T> = Arc<dyn Fn(&T, &mut Vec<u8>) + Send + Sync>;
type Decode<T> = Arc<dyn Fn(&[u8], &mut usize) -> Result<T, IngestError> + Send + Sync>;

pub struct BufferFile<T> {
    path: PathBuf,
    encode: Encode<T>,
    decode: Decode<T>,
}

impl<T> BufferFile<T> {
    pub fn new(
        path: impl Into<PathBuf>,
        encode: impl Fn(&T, &mut Vec<u8>) + Send + Sync + 'static,
        decode: impl Fn(&[u8], &mut usize) -> Result<T, IngestError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    /// Appends `items` to the buffer file, framed with this buffer's codec.
    pub async fn append(&self, items: &[T]) -> Result<(), IngestError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for item in items {
            (self.encode)(item, &mut buf);
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(IngestError::BufferIo)?;
        file.write_all(&buf).await.map_err(IngestError::BufferIo)?;
        file.flush().await.map_err(IngestError::BufferIo)?;
        Ok(())
    }

    /// Reads every frame back and deletes the file. Returns an empty `Vec`
    /// if the file does not exist yet.
    pub async fn drain(&self) -> Result<Vec<T>, IngestError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IngestError::BufferIo(e)),
        };

        let mut cursor = 0;
        let mut items = Vec::new();
        while cursor < bytes.len() {
            items.push((self.decode)(&bytes, &mut cursor)?);
        }

        tokio::fs::remove_file(&self.path).await.map_err(IngestError::BufferIo)?;
        Ok(items)
    }
}
