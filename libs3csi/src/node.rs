//! CSI Node service trait.
//!
//! The Node service runs on each worker node and handles the local filesystem
//! operations required to make a bucket available to Pod containers:
//!
//! 1. **Stage** — validate only; nothing is mounted at the staging path.
//! 2. **Publish** — FUSE-mount the bucket at the Pod's target path.
//! 3. **Unpublish** — unmount the target path.
//! 4. **Unstage** — validate only.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    NodeExpandVolumeRequest, NodeInfo, NodePublishVolumeRequest, NodeServiceCapability,
    NodeStageVolumeRequest, VolumeId, VolumeStats,
};

/// Node service — local mount / unmount operations.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// Stage a volume at the node-global staging path.
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError>;

    /// Unstage a volume from the staging path.
    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError>;

    /// Publish a volume at `req.target_path`.
    ///
    /// This is idempotent — calling it again for a `target_path` that is
    /// already a mount point succeeds without mounting twice.
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Unpublish a volume from `target_path`.
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError>;

    /// Advertise the optional node RPCs this plugin supports.
    async fn get_capabilities(&self) -> Result<Vec<NodeServiceCapability>, CsiError>;

    /// Grow a published volume.
    async fn expand_volume(&self, req: NodeExpandVolumeRequest) -> Result<(), CsiError>;

    /// Report filesystem usage of the volume published at `volume_path`.
    async fn get_volume_stats(
        &self,
        volume_id: &VolumeId,
        volume_path: &str,
    ) -> Result<VolumeStats, CsiError>;

    /// Return information about the node on which this service is running.
    async fn get_info(&self) -> Result<NodeInfo, CsiError>;
}
