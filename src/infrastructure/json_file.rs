// JSON file helpers - missing-aware reads and atomic replacement writes
use crate::domain::error::PersistenceFailure;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::Path;

/// Reads and decodes `path`. A missing file is `Ok(None)`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceFailure> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceFailure::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PersistenceFailure::format(path, e))
}

/// Writes `value` next to `path` and renames it into place, so readers never
/// observe a half-written file.
pub async fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), PersistenceFailure> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistenceFailure::format(path, e))?;
    write_atomic(path, &bytes).await
}

pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceFailure> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PersistenceFailure::io(parent, e))?;
    }
    let staging = path.with_extension("tmp");
    tokio::fs::write(&staging, bytes)
        .await
        .map_err(|e| PersistenceFailure::io(&staging, e))?;
    tokio::fs::rename(&staging, path)
        .await
        .map_err(|e| PersistenceFailure::io(path, e))
}
