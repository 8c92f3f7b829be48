use std::path::{Path, PathBuf};
use std::sync::Arc;

use reel_core::error::AppError;
use reel_core::models::Record;
use reel_core::traits::Sink;
use tokio::sync::Mutex;

const DATASET_DIR: &str = "datasets/default";
const KV_STORE_DIR: &str = "key_value_stores/default";

/// Filesystem sink in the managed-runtime local storage layout:
///
/// ```text
/// {root}/datasets/default/000000001.json      one file per appended record
/// {root}/key_value_stores/default/{key}       one file per blob
/// ```
///
/// Dataset numbering continues after the highest existing item, so repeated
/// runs against the same directory append rather than overwrite.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    /// Last used dataset index; `None` until the directory has been scanned.
    next_index: Arc<Mutex<Option<u64>>>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_index: Arc::new(Mutex::new(None)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.root.join(DATASET_DIR)
    }

    pub fn key_value_dir(&self) -> PathBuf {
        self.root.join(KV_STORE_DIR)
    }

    /// Reads every dataset item back, in index order.
    pub async fn dataset_items(&self) -> Result<Vec<Record>, AppError> {
        let mut indexed = Vec::new();
        for (index, path) in list_items(&self.dataset_dir()).await? {
            let raw = tokio::fs::read(&path)
                .await
                .map_err(|e| io_error("read", &path, e))?;
            indexed.push((index, serde_json::from_slice::<Record>(&raw)?));
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, record)| record).collect())
    }

    /// Reads a blob back, if present.
    pub async fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let path = self.key_value_dir().join(validate_key(key)?);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", &path, e)),
        }
    }
}

impl Sink for LocalStore {
    async fn append(&self, record: &Record) -> Result<(), AppError> {
        let dir = self.dataset_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error("create", &dir, e))?;

        let mut next = self.next_index.lock().await;
        let last = match *next {
            Some(last) => last,
            None => list_items(&dir)
                .await?
                .iter()
                .map(|(index, _)| *index)
                .max()
                .unwrap_or(0),
        };
        let index = last + 1;

        let path = dir.join(format!("{index:09}.json"));
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| io_error("write", &path, e))?;
        *next = Some(index);

        tracing::debug!(path = %path.display(), "Dataset item written");
        Ok(())
    }

    async fn put_blob(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), AppError> {
        let dir = self.key_value_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error("create", &dir, e))?;

        let path = dir.join(validate_key(key)?);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_error("write", &path, e))?;

        tracing::debug!(path = %path.display(), %content_type, bytes = bytes.len(), "Blob written");
        Ok(())
    }
}

/// Keys become file names, so anything that could escape the store
/// directory is rejected.
fn validate_key(key: &str) -> Result<&str, AppError> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
        return Err(AppError::SinkError(format!("Invalid blob key: {key:?}")));
    }
    Ok(key)
}

/// Numbered `*.json` items in a dataset directory. A missing directory is
/// an empty dataset.
async fn list_items(dir: &Path) -> Result<Vec<(u64, PathBuf)>, AppError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error("list", dir, e)),
    };

    let mut items = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error("list", dir, e))?
    {
        let path = entry.path();
        let index = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix(".json"))
            .and_then(|stem| stem.parse::<u64>().ok());
        if let Some(index) = index {
            items.push((index, path));
        }
    }
    Ok(items)
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> AppError {
    AppError::SinkError(format!("Failed to {action} {}: {err}", path.display()))
}
