//! Mount point detection.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::MountChecker;

/// Permission bits for target directories created on first publish.
const TARGET_DIR_MODE: u32 = 0o750;

/// Cheap mount point check: `path` is assumed to be a mount point when it
/// lives on a different device than the directory containing it.
///
/// The containing directory is taken lexically, so a symlinked `path` is
/// compared against the directory holding the link, not the link target's
/// parent.
///
/// Bind mounts of a directory onto the same filesystem are not detected.
/// A path that does not exist yields an [`io::ErrorKind::NotFound`] error.
pub async fn is_likely_not_mount_point(path: &Path) -> io::Result<bool> {
    let meta = tokio::fs::metadata(path).await?;
    let parent = match path.parent() {
        // `/` is always a mount point.
        None => return Ok(false),
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
    };
    let parent = tokio::fs::metadata(parent).await?;
    Ok(meta.dev() == parent.dev())
}

/// [`MountChecker`] backed by the local filesystem.
///
/// A missing target path is created (with parents, mode `0750`) and reported
/// as not mounted, so the first publish of a volume does not depend on the
/// orchestrator having created the directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMountChecker;

#[async_trait]
impl MountChecker for FsMountChecker {
    async fn check_mount(&self, target: &Path) -> io::Result<bool> {
        match is_likely_not_mount_point(target).await {
            Ok(not_mounted) => Ok(not_mounted),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %target.display(), "creating missing target path");
                tokio::fs::DirBuilder::new()
                    .recursive(true)
                    .mode(TARGET_DIR_MODE)
                    .create(target)
                    .await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}
