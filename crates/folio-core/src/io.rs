use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Copy `src` to `dest` only if `dest` does not exist. Returns true if copied.
pub fn copy_if_missing(src: &Path, dest: &Path) -> Result<bool> {
    if dest.exists() {
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dest)?;
    Ok(true)
}

/// Move `src` to `dest`, replacing `dest`. Falls back to copy + remove when a
/// plain rename fails (e.g. across filesystems).
pub fn move_file(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    std::fs::copy(src, dest)?;
    std::fs::remove_file(src)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.yaml");
        atomic_write(&path, b"title: x\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "title: x\n");
    }

    #[test]
    fn copy_if_missing_keeps_existing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.png");
        let dest = dir.path().join("out/src.png");
        std::fs::write(&src, b"one").unwrap();
        assert!(copy_if_missing(&src, &dest).unwrap());
        std::fs::write(&src, b"two").unwrap();
        assert!(!copy_if_missing(&src, &dest).unwrap());
        assert_eq!(std::fs::read(&dest).unwrap(), b"one");
    }

    #[test]
    fn move_file_replaces_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        let dest = dir.path().join("b/a.png");
        std::fs::write(&src, b"x").unwrap();
        move_file(&src, &dest).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"x");
    }
}
