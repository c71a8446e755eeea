//! `s3fs` mount provider.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Mounter, MounterFactory, MounterParams};
use crate::error::CsiError;

/// Mount tool identifier for s3fs-fuse.
pub const S3FS: &str = "s3fs";

/// Builds [`S3fsMounter`]s.
#[derive(Debug, Clone)]
pub struct S3fsMounterFactory {
    binary: PathBuf,
}

impl S3fsMounterFactory {
    /// Use the `s3fs` found on `PATH`.
    pub fn new() -> Self {
        Self::with_binary(S3FS)
    }

    /// Use a specific `s3fs` executable.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for S3fsMounterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MounterFactory for S3fsMounterFactory {
    fn new_mounter(&self, params: MounterParams) -> Result<Box<dyn Mounter>, CsiError> {
        if params.mounter != S3FS {
            return Err(CsiError::InvalidArgument(format!(
                "unsupported mounter {:?}",
                params.mounter
            )));
        }
        Ok(Box::new(S3fsMounter {
            binary: self.binary.clone(),
            params,
        }))
    }
}

/// Mounts one bucket with s3fs-fuse.
///
/// Credentials go to the child process through `AWSACCESSKEYID` /
/// `AWSSECRETACCESSKEY` and never appear on its command line. A read-only
/// publish adds `-o ro`; capability mount flags follow as `-o <flag>`.
#[derive(Debug)]
pub struct S3fsMounter {
    binary: PathBuf,
    params: MounterParams,
}

impl S3fsMounter {
    /// `<bucket>[:/<obj-path>] <target> [-o url=..] [-o endpoint=..] [-o ro] [-o <flag>]..`
    fn args(&self, target: &Path) -> Vec<OsString> {
        let p = &self.params;
        let obj_path = p.obj_path.trim_matches('/');
        let bucket = if obj_path.is_empty() {
            p.bucket.clone()
        } else {
            format!("{}:/{obj_path}", p.bucket)
        };

        let mut args = vec![OsString::from(bucket), target.as_os_str().to_owned()];
        if !p.endpoint.is_empty() {
            args.push("-o".into());
            args.push(format!("url={}", p.endpoint).into());
        }
        if !p.region.is_empty() {
            args.push("-o".into());
            args.push(format!("endpoint={}", p.region).into());
        }
        if p.read_only {
            args.push("-o".into());
            args.push("ro".into());
        }
        for flag in p.mount_flags.iter().filter(|f| !f.is_empty()) {
            args.push("-o".into());
            args.push(flag.into());
        }
        args
    }
}

#[async_trait]
impl Mounter for S3fsMounter {
    async fn mount(&self, _source: &str, target: &Path) -> Result<(), CsiError> {
        let mount_failed = |reason: String| CsiError::MountFailed {
            path: target.display().to_string(),
            reason,
        };

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(self.args(target));
        let (access_key, secret_key) = self.params.credentials();
        if !access_key.is_empty() {
            cmd.env("AWSACCESSKEYID", access_key);
        }
        if !secret_key.is_empty() {
            cmd.env("AWSSECRETACCESSKEY", secret_key);
        }

        debug!(binary = %self.binary.display(), args = ?self.args(target), "running mount tool");
        let output = cmd
            .output()
            .await
            .map_err(|e| mount_failed(format!("spawn {}: {e}", self.binary.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(mount_failed(if stderr.is_empty() {
                format!("{} exited with {}", self.binary.display(), output.status)
            } else {
                stderr.to_owned()
            }));
        }

        info!(bucket = %self.params.bucket, path = %target.display(), "s3fs mount complete");
        Ok(())
    }
}
