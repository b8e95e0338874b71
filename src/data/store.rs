//! Flat-file record store
//!
//! One JSON file per record, keyed by stable ID, grouped into namespace
//! directories (`accounts/<category>/`, `toots/`). Writes go through a
//! temp file in the target directory and a rename, so a concurrent reader
//! of the same ID sees either the old or the new record, never a torn one.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Record store error
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode error in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A record discovered by a namespace scan
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// Stable ID the record was written under
    pub id: String,
    pub path: PathBuf,
    /// Store modification time (drives age-based expiry)
    pub modified: SystemTime,
}

/// Flat per-entity file storage
///
/// Namespaces map to directories under the store root. Writers targeting
/// different IDs never conflict; same-ID writes are last-write-wins.
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Create a store rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        let mut dir = self.root.clone();
        for segment in namespace.split('/').filter(|s| !s.is_empty()) {
            dir.push(sanitize_component(segment));
        }
        dir
    }

    fn record_path(&self, namespace: &str, id: &str) -> PathBuf {
        self.namespace_dir(namespace)
            .join(format!("{}.json", sanitize_component(id)))
    }

    /// Write a record, unconditionally overwriting any existing one
    ///
    /// The record is serialized up front, written to a temp file in the
    /// namespace directory, then renamed over the final path.
    pub async fn put<T: Serialize>(
        &self,
        namespace: &str,
        id: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let dir = self.namespace_dir(namespace);
        tokio::fs::create_dir_all(&dir).await?;

        let body = serde_json::to_vec_pretty(record).map_err(StoreError::Encode)?;
        let path = self.record_path(namespace, id);

        tokio::task::spawn_blocking(move || -> Result<(), std::io::Error> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&body)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        Ok(())
    }

    /// Read a record by ID, `None` if it was never written
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let path = self.record_path(namespace, id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|source| StoreError::Decode { path, source })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all records in a namespace with their modification times
    ///
    /// A namespace that was never written to scans as empty. Ordering is
    /// unspecified; callers sort by whatever field they care about.
    pub async fn scan(&self, namespace: &str) -> Result<Vec<StoredEntry>, StoreError> {
        let dir = self.namespace_dir(namespace);
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                // A record renamed into place while scanning can vanish
                // between read_dir and metadata.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            entries.push(StoredEntry {
                id: id.to_string(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                path,
            });
        }

        Ok(entries)
    }

    /// Decode a scanned record
    pub async fn read_entry<T: DeserializeOwned>(
        &self,
        entry: &StoredEntry,
    ) -> Result<T, StoreError> {
        let bytes = tokio::fs::read(&entry.path).await?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            path: entry.path.clone(),
            source,
        })
    }
}

/// Map an ID or namespace segment to a safe file name component
///
/// IDs are opaque remote strings; anything outside `[A-Za-z0-9_-]`
/// (path separators, dots, spaces) is replaced so a hostile ID cannot
/// escape the namespace directory.
fn sanitize_component(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}
