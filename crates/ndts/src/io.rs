//! Atomic single-file replace: write to a `.tmp` sibling, fsync it, then
//! rename over the final path. Renaming is atomic on POSIX filesystems, so
//! readers never observe a partially written segment or tombstone.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use ndts_core::{NdtsError, Result};

pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = append_ext(path, ".tmp");

    let mut file = fs::File::create(&tmp_path).map_err(|e| NdtsError::io(&tmp_path, e))?;
    file.write_all(bytes).map_err(|e| NdtsError::io(&tmp_path, e))?;
    file.sync_all().map_err(|e| NdtsError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| NdtsError::io(path, e))?;

    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        fsync_dir(parent)?;
    }
    Ok(())
}

/// Removes any `.tmp` leftovers from a crash mid-write, mirroring the
/// teacher's own startup recovery sweep.
pub fn recover(base_dir: &Path) -> Result<()> {
    if !base_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(base_dir).map_err(|e| NdtsError::io(base_dir, e))? {
        let entry = entry.map_err(|e| NdtsError::io(base_dir, e))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            fs::remove_file(&path).map_err(|e| NdtsError::io(&path, e))?;
        }
    }
    Ok(())
}

fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(ext);
    PathBuf::from(s)
}

fn fsync_dir(dir: &Path) -> Result<()> {
    let f = fs::File::open(dir).map_err(|e| NdtsError::io(dir, e))?;
    f.sync_all().map_err(|e| NdtsError::io(dir, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_file_and_cleans_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.ndts");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!append_ext(&path, ".tmp").exists());
    }

    #[test]
    fn atomic_write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.ndts");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn recover_removes_stale_tmp_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("x.ndts.tmp");
        fs::write(&stale, b"partial").unwrap();
        recover(dir.path()).unwrap();
        assert!(!stale.exists());
    }
}
