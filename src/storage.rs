//! Atomic file commits shared by the configuration and curve stores.
//!
//! Every write goes to `<name>.tmp` next to the destination and is then
//! renamed over it, so a concurrent reader observes either the previous
//! complete file or the new complete file.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use log::debug;
use serde::Serialize;

use crate::error::StorageError;

/// Returns the temporary sibling used while committing `path`.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Creates the parent directory of `path` if it does not exist yet.
pub fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| StorageError::io("create directory", dir, e))
        }
        _ => Ok(()),
    }
}

/// Writes `bytes` to `path` through a temp file and a rename.
///
/// On failure the temp file is removed and the destination is left untouched.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);

    let written = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .map_err(|e| StorageError::io("write temporary file", &tmp, e));

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StorageError::io("rename into", path, e));
    }

    debug!("Committed {}", path.display());
    Ok(())
}

/// Pretty-prints `value` as JSON and commits it with [`atomic_write`].
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|source| StorageError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    text.push('\n');
    atomic_write(path, text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn tmp_path_appends_suffix() {
        let tmp = tmp_path(Path::new("/etc/nvfand/config.json"));
        assert_eq!(tmp, PathBuf::from("/etc/nvfand/config.json.tmp"));
    }

    #[test]
    fn atomic_write_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.json");

        atomic_write(&path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.json");
        fs::write(&path, "old").unwrap();

        atomic_write(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn stale_temp_file_never_reaches_destination() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("curve.json");
        fs::write(&path, r#"{"30": 30}"#).unwrap();

        // A writer killed between the temp write and the rename.
        fs::write(tmp_path(&path), r#"{"30": 3"#).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"30": 30}"#);

        atomic_write(&path, br#"{"40": 40}"#).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"40": 40}"#);
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn failed_rename_keeps_previous_file() {
        let dir = tempdir().unwrap();
        // A directory at the destination makes the rename fail.
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let err = atomic_write(&path, b"data").unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
        assert!(path.join("keep").exists());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn write_json_is_pretty_and_newline_terminated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_json(&path, &serde_json::json!({"gpu0": {"mode": "auto"}})).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("\n  \"gpu0\""));
    }
}
