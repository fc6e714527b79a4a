//! Filesystem utilities.
//!
//! Crash-tolerant writes for every artifact the pipeline hands to the next stage.
//! A half-written `.otio` or `.json` in a staging directory would be picked up
//! by the following stage, so output always goes through a temp file first.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Atomic Writes
// =============================================================================

/// Write bytes to `path` using an atomic replace pattern.
///
/// Implementation notes:
/// - Write to a sibling temporary file.
/// - Flush and sync the temp file.
/// - Swap into place by renaming.
/// - If the destination exists, it is first moved aside as a `.bak` file, then removed.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = sibling_with_suffix(path, "tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    atomic_replace(path, &tmp_path)
}

/// Write a JSON file atomically with pretty formatting.
///
/// Non-ASCII text is written as-is (UTF-8), never escaped.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut sibling = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| suffix.to_string());
    sibling.set_file_name(format!("{file_name}.{suffix}"));
    sibling
}

fn atomic_replace(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(src_tmp, dest)?;
        return Ok(());
    }

    // Windows: rename-over-existing may fail depending on filesystem; use a backup swap.
    let bak = sibling_with_suffix(dest, "bak");
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::IoError(e))
        }
    }
}

// =============================================================================
// Reads
// =============================================================================

/// Reads and deserializes a JSON file, mapping a missing file to `FileNotFound`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CoreError::FileNotFound(path.display().to_string()),
        _ => CoreError::IoError(e),
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Reads at most `limit` bytes from the start of a file, lossily decoded as UTF-8.
pub fn read_head(path: &Path, limit: usize) -> CoreResult<String> {
    let file = File::open(path)?;
    let mut buf = Vec::with_capacity(limit);
    file.take(limit as u64).read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Returns `path` with its extension replaced, e.g. `cut.otio` -> `cut.json`.
pub fn with_extension(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_bytes_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cut.json");

        atomic_write_bytes(&path, b"first").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        atomic_write_bytes(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        assert!(!sibling_with_suffix(&path, "tmp").exists());
        assert!(!sibling_with_suffix(&path, "bak").exists());
    }

    #[test]
    fn atomic_write_json_keeps_unicode_unescaped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");

        atomic_write_json_pretty(&path, &serde_json::json!({"name": "Première"})).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Première"));
    }

    #[test]
    fn read_json_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_json::<serde_json::Value>(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CoreError::FileNotFound(_)));
    }

    #[test]
    fn read_head_is_bounded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.otio");
        std::fs::write(&path, "x".repeat(5000)).unwrap();

        assert_eq!(read_head(&path, 1000).unwrap().len(), 1000);
    }

    #[test]
    fn with_extension_swaps_suffix() {
        assert_eq!(
            with_extension(Path::new("/tmp/Edit v2.otio"), ".json"),
            PathBuf::from("/tmp/Edit v2.json")
        );
    }
}
