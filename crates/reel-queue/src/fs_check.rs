//! Startup check that the queue directories can give atomic renames.
//!
//! `rename(2)` is only atomic within one local filesystem. A queue whose
//! state directories straddle mount points, or that lives on a network
//! filesystem, can hand the same job to two workers.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};

#[cfg(target_os = "linux")]
const NETWORK_FS_MAGIC: &[(i64, &str)] = &[
    (0x6969, "nfs"),
    (0x517B, "smb"),
    (0xFF53_4D42, "cifs"),
    (0xFE53_4D42, "smb2"),
    (0x5346_414F, "afs"),
    (0x00C3_6400, "ceph"),
    (0x0102_1997, "9p"),
];

/// Refuse to run if `dirs` are not all on the same local filesystem as `base`.
pub fn ensure_local_filesystem(base: &Path, dirs: &[PathBuf], allow_network_fs: bool) -> QueueResult<()> {
    ensure_single_device(base, dirs)?;

    match network_filesystem(base)? {
        Some(kind) if allow_network_fs => {
            warn!(
                "Queue data at {} is on a network filesystem ({}); claims may not be exclusive",
                base.display(),
                kind
            );
        }
        Some(kind) => {
            return Err(QueueError::unsupported_filesystem(
                base,
                format!("{} does not guarantee atomic rename", kind),
            ));
        }
        None => debug!("Queue data at {} is on a local filesystem", base.display()),
    }

    Ok(())
}

#[cfg(unix)]
fn ensure_single_device(base: &Path, dirs: &[PathBuf]) -> QueueResult<()> {
    use std::os::unix::fs::MetadataExt;

    let base_dev = std::fs::metadata(base)?.dev();
    for dir in dirs {
        if std::fs::metadata(dir)?.dev() != base_dev {
            return Err(QueueError::unsupported_filesystem(
                dir,
                format!("not on the same filesystem as {}", base.display()),
            ));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_single_device(_base: &Path, _dirs: &[PathBuf]) -> QueueResult<()> {
    Ok(())
}

#[cfg(target_os = "linux")]
fn network_filesystem(path: &Path) -> QueueResult<Option<&'static str>> {
    let stat = nix::sys::statfs::statfs(path).map_err(std::io::Error::from)?;
    let magic = stat.filesystem_type().0 as i64;
    Ok(NETWORK_FS_MAGIC
        .iter()
        .find(|(m, _)| *m == magic)
        .map(|(_, name)| *name))
}

#[cfg(not(target_os = "linux"))]
fn network_filesystem(_path: &Path) -> QueueResult<Option<&'static str>> {
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tempdir_is_accepted() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("pending");
        std::fs::create_dir_all(&sub).unwrap();

        // A tmpfs or local disk; either way the same device.
        ensure_local_filesystem(dir.path(), &[sub], true).unwrap();
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        let result = ensure_local_filesystem(dir.path(), &[missing], true);
        assert!(matches!(result, Err(QueueError::Io(_))));
    }
}
