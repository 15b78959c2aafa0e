//! Owner-only file helpers for key material.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

pub const DIR_MODE_PRIVATE: u32 = 0o700;
pub const FILE_MODE_PRIVATE: u32 = 0o600;
/// CA certificates are public and read by other services.
pub const FILE_MODE_PUBLIC: u32 = 0o644;

/// Create `path` and its parents, restricting the leaf directory to the owner.
pub fn ensure_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    set_mode(path, DIR_MODE_PRIVATE)
}

/// Write `contents` to `path` through a sibling temp file and a rename, so a
/// reader never observes a half-written key or certificate.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let tmp = temp_path(path);
    // A crashed earlier write may have left the temp file with other permissions.
    remove_if_exists(&tmp)?;

    let mut file = create_with_mode(&tmp, mode)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    set_mode(&tmp, mode)?;
    fs::rename(&tmp, path)
}

/// Remove a file, treating "already gone" as success. Returns whether a file was removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Read a file, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

fn create_with_mode(path: &Path, mode: u32) -> io::Result<fs::File> {
    let mut opts = fs::OpenOptions::new();
    opts.create_new(true).write(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    opts.open(path)
}

fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ca.key");

        write_atomic(&path, b"first", FILE_MODE_PRIVATE).unwrap();
        write_atomic(&path, b"second", FILE_MODE_PRIVATE).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!temp_path(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_private_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let tls_dir = dir.path().join("tls");
        ensure_private_dir(&tls_dir).unwrap();
        let key = tls_dir.join("ca.key");
        write_atomic(&key, b"secret", FILE_MODE_PRIVATE).unwrap();

        let dir_mode = fs::metadata(&tls_dir).unwrap().permissions().mode() & 0o777;
        let file_mode = fs::metadata(&key).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, DIR_MODE_PRIVATE);
        assert_eq!(file_mode, FILE_MODE_PRIVATE);
    }

    #[test]
    fn test_remove_and_read_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.crt");

        assert!(!remove_if_exists(&path).unwrap());
        assert!(read_optional(&path).unwrap().is_none());

        fs::write(&path, b"x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
    }
}
