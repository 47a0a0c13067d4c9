//! File persistence: atomic single-file writes and the paired artifact/sidecar
//! write used by every run.
//!
//! Every write goes to a `.tmp` sibling first and is then moved or linked into
//! place, so a reader never observes a half-written file.

use crate::error::{PipelineError, Result};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Atomically write raw bytes to a file, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    std::fs::write(&tmp, data)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// `<name>.tmp` next to the target.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a data artifact and its metadata sidecar so that either both exist
/// afterwards or neither does.
///
/// Existing files are never overwritten, even by a concurrent writer that
/// picked the same names. Both payloads are staged under private `.tmp`
/// names, then hard-linked into place, artifact first. Linking fails when the
/// target exists, which makes the placement exclusive. If the sidecar cannot
/// be placed, the artifact is removed again.
pub fn write_pair(
    artifact: &Path,
    artifact_bytes: &[u8],
    metadata: &Path,
    metadata_bytes: &[u8],
) -> Result<()> {
    for target in [artifact, metadata] {
        if target.exists() {
            return Err(refuse_overwrite(target));
        }
    }

    let staged_artifact = stage(artifact, artifact_bytes)?;
    let staged_metadata = match stage(metadata, metadata_bytes) {
        Ok(path) => path,
        Err(e) => {
            let _ = std::fs::remove_file(&staged_artifact);
            return Err(e);
        }
    };
    let cleanup = || {
        let _ = std::fs::remove_file(&staged_artifact);
        let _ = std::fs::remove_file(&staged_metadata);
    };

    if let Err(e) = place(&staged_artifact, artifact) {
        cleanup();
        return Err(e);
    }
    if let Err(e) = place(&staged_metadata, metadata) {
        let _ = std::fs::remove_file(artifact);
        cleanup();
        return Err(e);
    }

    cleanup();
    Ok(())
}

/// Link a staged file to its final name, failing if the name is taken.
fn place(staged: &Path, target: &Path) -> Result<()> {
    std::fs::hard_link(staged, target).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => refuse_overwrite(target),
        _ => PipelineError::write(target, e),
    })
}

fn refuse_overwrite(target: &Path) -> PipelineError {
    PipelineError::write(target, "refusing to overwrite existing file")
}

/// `<name>.<random>.tmp` next to the target, unique per call.
fn staging_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

fn stage(target: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::write(parent, e))?;
    }
    let tmp = staging_sibling(target);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(PipelineError::write(target, e));
    }
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn file_count(dir: &Path) -> usize {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }

    #[test]
    fn test_atomic_write_replaces_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("quickelt.toml");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!tmp_sibling(&path).exists());
    }

    #[test]
    fn test_tmp_sibling_keeps_extension() {
        assert_eq!(
            tmp_sibling(Path::new("/a/demo.parquet")),
            PathBuf::from("/a/demo.parquet.tmp")
        );
    }

    #[test]
    fn test_write_pair_writes_both() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("bronze").join("demo.csv");
        let metadata = dir.path().join("metadata").join("2026").join("demo_metadata.json");
        write_pair(&artifact, b"id\n1\n", &metadata, b"{}").unwrap();
        assert_eq!(std::fs::read(&artifact).unwrap(), b"id\n1\n");
        assert_eq!(std::fs::read(&metadata).unwrap(), b"{}");
        assert_eq!(file_count(dir.path()), 2);
    }

    #[test]
    fn test_write_pair_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("demo.csv");
        let metadata = dir.path().join("demo_metadata.json");
        std::fs::write(&metadata, b"original").unwrap();

        let err = write_pair(&artifact, b"new", &metadata, b"new").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        assert!(!artifact.exists());
        assert_eq!(std::fs::read(&metadata).unwrap(), b"original");
    }

    #[test]
    fn test_write_pair_leaves_nothing_when_sidecar_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("metadata");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let artifact = dir.path().join("bronze").join("demo.csv");
        let metadata = blocker.join("demo_metadata.json");
        let err = write_pair(&artifact, b"id\n", &metadata, b"{}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        assert!(!artifact.exists());
        assert_eq!(file_count(dir.path()), 1);
    }

    #[test]
    fn test_write_pair_concurrent_writers_never_both_succeed() {
        use std::sync::{Arc, Barrier};

        for _ in 0..50 {
            let dir = TempDir::new().unwrap();
            let artifact = dir.path().join("bronze").join("demo.jsonl");
            let metadata = dir.path().join("metadata").join("demo_metadata.json");
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = [b"writer-a", b"writer-b"]
                .into_iter()
                .map(|payload| {
                    let (artifact, metadata) = (artifact.clone(), metadata.clone());
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        write_pair(&artifact, payload, &metadata, payload).is_ok()
                    })
                })
                .collect();
            let succeeded = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();

            assert_eq!(succeeded, 1);
            let data = std::fs::read(&artifact).unwrap();
            assert_eq!(data, std::fs::read(&metadata).unwrap());
            assert_eq!(file_count(dir.path()), 2);
        }
    }
}
