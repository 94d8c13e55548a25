//! Repository-related utilities.
//!
//! Every stored document is a single pretty-printed JSON file. These helpers centralise reading,
//! writing and listing them so error mapping stays consistent across repositories.

use crate::constants::JSON_EXTENSION;
use crate::{CqmError, CqmResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Path of the JSON document for `id` inside `dir`.
pub(crate) fn json_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(id).with_extension(JSON_EXTENSION)
}

/// Reads and deserialises a JSON document.
///
/// # Errors
///
/// Returns `CqmError::FileRead` if the file cannot be read, or `CqmError::Deserialization`
/// (naming the file) if its contents do not match `T`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> CqmResult<T> {
    let contents = fs::read_to_string(path).map_err(CqmError::FileRead)?;
    serde_json::from_str(&contents).map_err(|source| CqmError::Deserialization {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON document, mapping a missing file to `CqmError::NotFound`.
pub(crate) fn read_existing<T: DeserializeOwned>(
    path: &Path,
    kind: &'static str,
    id: &str,
) -> CqmResult<T> {
    match read_json(path) {
        Err(CqmError::FileRead(e)) if e.kind() == ErrorKind::NotFound => Err(CqmError::NotFound {
            kind,
            id: id.to_owned(),
        }),
        other => other,
    }
}

/// Serialises `value` and writes it to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns `CqmError::StorageDirCreation`, `CqmError::Serialization` or `CqmError::FileWrite`
/// depending on which step fails.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> CqmResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(CqmError::StorageDirCreation)?;
    }

    let json = serde_json::to_string_pretty(value).map_err(CqmError::Serialization)?;
    fs::write(path, json).map_err(CqmError::FileWrite)
}

/// Lists the JSON documents directly inside `dir`, sorted by path.
///
/// A missing directory is treated as empty.
///
/// # Errors
///
/// Returns `CqmError::FileRead` if the directory exists but cannot be read.
pub(crate) fn list_json_files(dir: &Path) -> CqmResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(it) => it,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CqmError::FileRead(e)),
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(JSON_EXTENSION)
        })
        .collect();
    files.sort();

    Ok(files)
}

/// Reads every JSON document in `dir`, skipping (and logging) files that fail to parse.
pub(crate) fn read_all<T: DeserializeOwned>(dir: &Path) -> CqmResult<Vec<T>> {
    let mut documents = Vec::new();

    for path in list_json_files(dir)? {
        match read_json(&path) {
            Ok(document) => documents.push(document),
            Err(e) => {
                tracing::warn!("skipping unreadable document: {} - {}", path.display(), e);
            }
        }
    }

    Ok(documents)
}
