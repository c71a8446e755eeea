//! FUSE unmount provider.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use super::Unmounter;
use crate::error::CsiError;

/// Unmounts FUSE filesystems with `fusermount3 -u` (or `fusermount -u` on
/// older systems), falling back to a lazy `umount2` syscall.
#[derive(Debug, Default, Clone, Copy)]
pub struct FuseUnmounter;

#[async_trait]
impl Unmounter for FuseUnmounter {
    async fn unmount(&self, target: &Path) -> Result<(), CsiError> {
        let mut failures = Vec::new();

        for cmd_name in ["fusermount3", "fusermount"] {
            match tokio::process::Command::new(cmd_name)
                .arg("-u")
                .arg(target)
                .output()
                .await
            {
                Ok(output) if output.status.success() => {
                    info!(path = %target.display(), "{cmd_name} -u succeeded");
                    return Ok(());
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
                    debug!("{cmd_name} -u {} failed: {stderr}", target.display());
                    failures.push(format!("{cmd_name}: {stderr}"));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    debug!("{cmd_name} -u {} error: {e}", target.display());
                    failures.push(format!("{cmd_name}: {e}"));
                }
            }
        }

        // Last resort: raw umount syscall
        match nix::mount::umount2(target, nix::mount::MntFlags::MNT_DETACH) {
            Ok(()) => {
                info!(path = %target.display(), "umount2 succeeded");
                Ok(())
            }
            Err(e) => {
                failures.push(format!("umount2: {e}"));
                Err(CsiError::UnmountFailed {
                    path: target.display().to_string(),
                    reason: failures.join("; "),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;

    #[tokio::test]
    async fn unmounting_plain_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = FuseUnmounter.unmount(tmp.path()).await.unwrap_err();
        match &err {
            CsiError::UnmountFailed { path, reason } => {
                assert_eq!(path, &tmp.path().display().to_string());
                assert!(reason.contains("umount2"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.code(), Code::Internal);
    }
}
