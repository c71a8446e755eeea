//! S3 bucket backend for the CSI node service.
//!
//! [`S3Backend`] implements [`CsiIdentity`] and [`CsiNode`].  Buckets are
//! FUSE-mounted straight at the Pod's target path on publish and unmounted on
//! unpublish; stage and unstage only validate their requests.
//!
//! # Volume context
//!
//! | Key | Meaning |
//! |---|---|
//! | `bucket-name` | bucket to mount |
//! | `obj-path` | prefix inside the bucket, mounted instead of the root |
//! | `cos-endpoint` | object storage service URL |
//! | `regn-class` | region used for request signing |
//!
//! Credentials come from the `access-key` / `secret-key` secrets.  Missing
//! keys are passed on as empty strings.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::mount::{
    FsMountChecker, FuseUnmounter, MountChecker, MounterFactory, MounterParams, S3FS,
    S3fsMounterFactory, Unmounter,
};
use crate::node::CsiNode;
use crate::types::*;

pub const CTX_BUCKET_NAME: &str = "bucket-name";
pub const CTX_OBJ_PATH: &str = "obj-path";
pub const CTX_ENDPOINT: &str = "cos-endpoint";
pub const CTX_REGION: &str = "regn-class";
pub const SECRET_ACCESS_KEY: &str = "access-key";
pub const SECRET_SECRET_KEY: &str = "secret-key";

/// Publish context key carrying the attached device, logged only.
const PUBLISH_CTX_DEVICE_ID: &str = "deviceID";

/// Static settings of one node service instance.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Name reported by `GetPluginInfo`.
    pub plugin_name: String,
    /// Node identifier reported by `NodeGetInfo`.
    pub node_id: String,
    /// Volume limit reported by `NodeGetInfo`; `0` means unlimited.
    pub max_volumes: u64,
}

/// Concrete CSI node service for S3 buckets.
///
/// # Concurrency
///
/// A single lock serializes stage, unstage, publish and unpublish across
/// *all* volumes: concurrent mounts of unrelated buckets have not been shown
/// to be safe, so at most one lifecycle operation runs at a time.  The lock is
/// held across the mount tool invocation, which has no timeout; a hung tool
/// stalls every later lifecycle call on this node.
pub struct S3Backend {
    options: NodeOptions,
    lock: Mutex<()>,
    mounter_factory: Arc<dyn MounterFactory>,
    unmounter: Arc<dyn Unmounter>,
    mount_checker: Arc<dyn MountChecker>,
}

impl S3Backend {
    /// Create a backend that mounts with `s3fs`, unmounts with
    /// `fusermount`, and inspects the local filesystem.
    pub fn new(options: NodeOptions) -> Self {
        Self::with_providers(
            options,
            Arc::new(S3fsMounterFactory::new()),
            Arc::new(FuseUnmounter),
            Arc::new(FsMountChecker),
        )
    }

    /// Create a backend with explicit mount collaborators.
    pub fn with_providers(
        options: NodeOptions,
        mounter_factory: Arc<dyn MounterFactory>,
        unmounter: Arc<dyn Unmounter>,
        mount_checker: Arc<dyn MountChecker>,
    ) -> Self {
        Self {
            options,
            lock: Mutex::new(()),
            mounter_factory,
            unmounter,
            mount_checker,
        }
    }
}

fn context_value(ctx: &HashMap<String, String>, key: &str) -> String {
    ctx.get(key).cloned().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// CsiIdentity
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiIdentity for S3Backend {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        Ok(PluginInfo {
            name: self.options.plugin_name.clone(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// CsiNode
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiNode for S3Backend {
    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError> {
        let _guard = self.lock.lock().await;

        if req.volume_id.is_empty() {
            return Err(CsiError::missing("Volume ID"));
        }
        if req.staging_target_path.is_empty() {
            return Err(CsiError::missing("Staging target path"));
        }
        if req.volume_capability.is_none() {
            return Err(CsiError::missing("Volume capability"));
        }

        // Buckets are mounted per target path on publish.
        debug!(staging_target_path = %req.staging_target_path, "stage is a no-op");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError> {
        let _guard = self.lock.lock().await;

        if volume_id.is_empty() {
            return Err(CsiError::missing("Volume ID"));
        }
        if staging_target_path.is_empty() {
            return Err(CsiError::missing("Staging target path"));
        }

        debug!("unstage is a no-op");
        Ok(())
    }

    #[instrument(skip_all, fields(volume_id = %req.volume_id, target_path = %req.target_path))]
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        let _guard = self.lock.lock().await;

        if req.volume_id.is_empty() {
            return Err(CsiError::missing("Volume ID"));
        }
        if req.target_path.is_empty() {
            return Err(CsiError::missing("Target path"));
        }
        if req.staging_target_path.is_empty() {
            return Err(CsiError::missing("Staging target path"));
        }
        let Some(capability) = req.volume_capability.as_ref() else {
            return Err(CsiError::missing("Volume capability"));
        };

        let target = Path::new(&req.target_path);
        let not_mounted = self.mount_checker.check_mount(target).await.map_err(|e| {
            error!(error = %e, "cannot validate target mount point");
            CsiError::internal(e)
        })?;
        if !not_mounted {
            debug!("target already mounted, assuming idempotent retry");
            return Ok(());
        }

        info!(
            device_id = req.publish_context.get(PUBLISH_CTX_DEVICE_ID).map(String::as_str),
            read_only = req.read_only,
            mount_flags = ?capability.mount_flags,
            volume_context = ?req.volume_context,
            secrets = ?req.secrets,
            "mounting bucket",
        );

        let params = MounterParams {
            mounter: S3FS.to_owned(),
            bucket: context_value(&req.volume_context, CTX_BUCKET_NAME),
            obj_path: context_value(&req.volume_context, CTX_OBJ_PATH),
            endpoint: context_value(&req.volume_context, CTX_ENDPOINT),
            region: context_value(&req.volume_context, CTX_REGION),
            keys: format!(
                "{}:{}",
                req.secrets.get_or_empty(SECRET_ACCESS_KEY),
                req.secrets.get_or_empty(SECRET_SECRET_KEY),
            ),
            read_only: req.read_only,
            mount_flags: capability.mount_flags.clone(),
        };
        let bucket = params.bucket.clone();

        // Provider errors keep their message but always carry `Internal`.
        let as_mount_failure = |e: CsiError| match e {
            e @ CsiError::MountFailed { .. } => e,
            other => CsiError::MountFailed {
                path: req.target_path.clone(),
                reason: other.to_string(),
            },
        };
        let mounter = self
            .mounter_factory
            .new_mounter(params)
            .map_err(as_mount_failure)?;
        mounter.mount("", target).await.map_err(|e| {
            error!(error = %e, "bucket mount failed");
            as_mount_failure(e)
        })?;

        info!(%bucket, "bucket successfully mounted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError> {
        let _guard = self.lock.lock().await;

        if volume_id.is_empty() {
            return Err(CsiError::missing("Volume ID"));
        }
        if target_path.is_empty() {
            return Err(CsiError::missing("Target path"));
        }

        info!("unmounting target path");
        self.unmounter
            .unmount(Path::new(target_path))
            .await
            .map_err(|e| {
                error!(error = %e, "unmount failed");
                match e {
                    e @ CsiError::UnmountFailed { .. } => e,
                    other => CsiError::UnmountFailed {
                        path: target_path.to_owned(),
                        reason: other.to_string(),
                    },
                }
            })?;

        info!("target path unmounted");
        Ok(())
    }

    async fn get_capabilities(&self) -> Result<Vec<NodeServiceCapability>, CsiError> {
        Ok(vec![NodeServiceCapability::GetVolumeStats])
    }

    async fn expand_volume(&self, _req: NodeExpandVolumeRequest) -> Result<(), CsiError> {
        Err(CsiError::Unimplemented(
            "NodeExpandVolume is not implemented".to_owned(),
        ))
    }

    #[instrument(skip(self))]
    async fn get_volume_stats(
        &self,
        volume_id: &VolumeId,
        volume_path: &str,
    ) -> Result<VolumeStats, CsiError> {
        if volume_id.is_empty() {
            return Err(CsiError::missing("Volume ID"));
        }
        if volume_path.is_empty() {
            return Err(CsiError::missing("Volume path"));
        }

        match tokio::fs::metadata(volume_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CsiError::VolumeNotFound(volume_path.to_owned()));
            }
            Err(e) => return Err(CsiError::Internal(format!("stat {volume_path}: {e}"))),
        }

        let stat = nix::sys::statvfs::statvfs(volume_path)
            .map_err(|e| CsiError::Internal(format!("statvfs {volume_path}: {e}")))?;
        let frsize = stat.fragment_size() as u64;
        let blocks = stat.blocks() as u64;
        let files = stat.files() as u64;
        let files_free = stat.files_free() as u64;

        Ok(VolumeStats {
            total_bytes: blocks.saturating_mul(frsize),
            used_bytes: blocks
                .saturating_sub(stat.blocks_free() as u64)
                .saturating_mul(frsize),
            available_bytes: (stat.blocks_available() as u64).saturating_mul(frsize),
            total_inodes: files,
            used_inodes: files.saturating_sub(files_free),
            free_inodes: files_free,
        })
    }

    async fn get_info(&self) -> Result<NodeInfo, CsiError> {
        Ok(NodeInfo {
            node_id: self.options.node_id.clone(),
            max_volumes: self.options.max_volumes,
            accessible_topology: Some(Topology {
                segments: HashMap::from([("node".to_owned(), self.options.node_id.clone())]),
            }),
        })
    }
}
