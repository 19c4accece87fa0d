//! Filesystem helpers: content fingerprints, atomic writes, file moves.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::error::ExtractResult;

/// Length of the hex fingerprint stored as `periods.pdf_hash`
pub const FINGERPRINT_LEN: usize = 12;

/// Fingerprint of raw PDF bytes: first 12 hex chars of the SHA-256 digest.
///
/// Serves as the idempotency key for cache hits and file/store sync.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

/// Fingerprint of a file on disk
pub fn fingerprint_file(path: &Path) -> ExtractResult<String> {
    let bytes = std::fs::read(path)?;
    Ok(fingerprint(&bytes))
}

/// Write `contents` to `path` atomically: write a sibling temp file, then
/// rename over the target. Readers never observe a half-written file.
pub fn atomic_write(path: &Path, contents: &str) -> ExtractResult<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Move a file into `target_dir`, creating the directory if needed.
/// Returns the new path. A file already inside `target_dir` is left alone.
pub fn move_into_dir(source: &Path, target_dir: &Path) -> ExtractResult<PathBuf> {
    std::fs::create_dir_all(target_dir)?;

    let file_name = source
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    let target = target_dir.join(file_name);

    if source.parent() == Some(target_dir) {
        return Ok(source.to_path_buf());
    }

    // rename fails across filesystems, fall back to copy+remove
    match std::fs::rename(source, &target) {
        Ok(()) => {}
        Err(_) => {
            std::fs::copy(source, &target)?;
            std::fs::remove_file(source)?;
        }
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_12_hex_chars() {
        let fp = fingerprint(b"%PDF-1.7 fake bytes");
        assert_eq!(fp.len(), 12);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_changes_with_content() {
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
        assert_eq!(fingerprint(b"a"), fingerprint(b"a"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");

        atomic_write(&path, "{\"a\":1}").unwrap();
        atomic_write(&path, "{\"a\":2}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":2}");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn move_into_dir_is_idempotent_for_moved_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("report.pdf");
        std::fs::write(&src, b"pdf").unwrap();

        let target_dir = dir.path().join("persisted");
        let moved = move_into_dir(&src, &target_dir).unwrap();
        assert!(moved.exists());
        assert!(!src.exists());

        // moving a file already in place returns the same path
        let again = move_into_dir(&moved, &target_dir).unwrap();
        assert_eq!(again, moved);
    }
}
