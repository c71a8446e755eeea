//! Mount providers used by the node service.
//!
//! The node service never touches the mount table itself.  It is handed three
//! collaborators at construction time:
//!
//! * a [`MounterFactory`] that builds a [`Mounter`] for one bucket/credential
//!   combination ([`S3fsMounterFactory`] in production),
//! * an [`Unmounter`] that tears a target path down ([`FuseUnmounter`]),
//! * a [`MountChecker`] that decides whether a target path still needs
//!   mounting ([`FsMountChecker`]).

pub mod check;
pub mod s3fs;
pub mod unmount;

use std::fmt;
use std::io;
use std::path::Path;

use async_trait::async_trait;

use crate::error::CsiError;

pub use check::{FsMountChecker, is_likely_not_mount_point};
pub use s3fs::{S3FS, S3fsMounter, S3fsMounterFactory};
pub use unmount::FuseUnmounter;

/// Everything needed to mount one bucket.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MounterParams {
    /// Mount tool identifier, e.g. [`S3FS`].
    pub mounter: String,
    pub bucket: String,
    /// Prefix inside the bucket to mount instead of the bucket root.
    pub obj_path: String,
    /// Object storage service URL.
    pub endpoint: String,
    /// Region / location constraint for request signing.
    pub region: String,
    /// Credentials formatted as `<access-key>:<secret-key>`.
    pub keys: String,
    pub read_only: bool,
    /// Extra tool options from the volume capability, passed as `-o <flag>`.
    pub mount_flags: Vec<String>,
}

impl MounterParams {
    /// Split [`Self::keys`] into access key and secret key.
    pub fn credentials(&self) -> (&str, &str) {
        self.keys.split_once(':').unwrap_or((self.keys.as_str(), ""))
    }
}

impl fmt::Debug for MounterParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MounterParams")
            .field("mounter", &self.mounter)
            .field("bucket", &self.bucket)
            .field("obj_path", &self.obj_path)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("keys", &"<redacted>")
            .field("read_only", &self.read_only)
            .field("mount_flags", &self.mount_flags)
            .finish()
    }
}

/// A mount tool bound to one bucket.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Mount the bucket at `target`.  `source` is tool specific and may be
    /// empty when the bucket itself is the source.
    async fn mount(&self, source: &str, target: &Path) -> Result<(), CsiError>;
}

/// Builds a [`Mounter`] per publish call.
pub trait MounterFactory: Send + Sync {
    fn new_mounter(&self, params: MounterParams) -> Result<Box<dyn Mounter>, CsiError>;
}

/// Tears down whatever is mounted at a target path.
#[async_trait]
pub trait Unmounter: Send + Sync {
    async fn unmount(&self, target: &Path) -> Result<(), CsiError>;
}

/// Decides whether a target path still needs mounting.
///
/// `check_mount` returns `true` when `target` is **not** a mount point.
/// Implementations may create `target` when it does not exist yet, so this is
/// not a pure predicate; calling it repeatedly must be safe.
#[async_trait]
pub trait MountChecker: Send + Sync {
    async fn check_mount(&self, target: &Path) -> io::Result<bool>;
}
