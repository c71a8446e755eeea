//! CSI protocol messages transmitted over QUIC.
//!
//! [`CsiMessage`] is the top-level envelope for all request and response
//! variants exchanged between the orchestrator-side CSI client and the node
//! CSI server via QUIC bi-directional streams.

use serde::{Deserialize, Serialize};

use crate::error::CsiError;
use crate::types::*;

/// Top-level message envelope for CSI over QUIC.
///
/// Each QUIC bi-stream carries exactly one request followed by one response.
/// The client sends a *request* variant and the server replies with the
/// corresponding *response* variant (or [`CsiMessage::Error`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CsiMessage {
    // ----- Requests --------------------------------------------------------
    /// `NodeStageVolume`.
    StageVolume(NodeStageVolumeRequest),
    /// `NodeUnstageVolume`.
    UnstageVolume {
        volume_id: VolumeId,
        staging_target_path: String,
    },
    /// `NodePublishVolume`.
    PublishVolume(NodePublishVolumeRequest),
    /// `NodeUnpublishVolume`.
    UnpublishVolume {
        volume_id: VolumeId,
        target_path: String,
    },
    /// `NodeGetCapabilities`.
    GetNodeCapabilities,
    /// `NodeExpandVolume`.
    ExpandVolume(NodeExpandVolumeRequest),
    /// `NodeGetVolumeStats`.
    GetVolumeStats {
        volume_id: VolumeId,
        volume_path: String,
    },
    /// `NodeGetInfo`.
    GetNodeInfo,

    /// Health probe (Identity).
    Probe,
    /// Query plugin info (Identity).
    GetPluginInfo,
    /// Query plugin capabilities (Identity).
    GetPluginCapabilities,

    // ----- Responses -------------------------------------------------------
    /// Node service capabilities.
    NodeCapabilitiesResponse(Vec<NodeServiceCapability>),
    /// Filesystem usage of a volume.
    VolumeStatsResponse(VolumeStats),
    /// Node information.
    NodeInfoResponse(NodeInfo),
    /// Plugin information.
    PluginInfoResponse(PluginInfo),
    /// Plugin capabilities.
    PluginCapabilitiesResponse(Vec<PluginCapability>),

    /// Generic success acknowledgement (no payload).
    Ok,
    /// Probe result.
    ProbeResult(bool),
    /// An error occurred.
    Error(CsiError),
}

impl std::fmt::Display for CsiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StageVolume(req) => write!(f, "StageVolume({})", req.volume_id),
            Self::UnstageVolume { volume_id, .. } => write!(f, "UnstageVolume({})", volume_id),
            Self::PublishVolume(req) => write!(f, "PublishVolume({})", req.volume_id),
            Self::UnpublishVolume { volume_id, .. } => {
                write!(f, "UnpublishVolume({})", volume_id)
            }
            Self::GetNodeCapabilities => f.write_str("GetNodeCapabilities"),
            Self::ExpandVolume(req) => write!(f, "ExpandVolume({})", req.volume_id),
            Self::GetVolumeStats { volume_id, .. } => write!(f, "GetVolumeStats({})", volume_id),
            Self::GetNodeInfo => f.write_str("GetNodeInfo"),
            Self::Probe => f.write_str("Probe"),
            Self::GetPluginInfo => f.write_str("GetPluginInfo"),
            Self::GetPluginCapabilities => f.write_str("GetPluginCapabilities"),
            Self::NodeCapabilitiesResponse(caps) => {
                write!(f, "NodeCapabilities(count={})", caps.len())
            }
            Self::VolumeStatsResponse(stats) => {
                write!(f, "VolumeStats(total_bytes={})", stats.total_bytes)
            }
            Self::NodeInfoResponse(info) => write!(f, "NodeInfo({})", info.node_id),
            Self::PluginInfoResponse(info) => {
                write!(f, "PluginInfo(name={})", info.name)
            }
            Self::PluginCapabilitiesResponse(caps) => {
                write!(f, "PluginCapabilities(count={})", caps.len())
            }
            Self::Ok => f.write_str("Ok"),
            Self::ProbeResult(ok) => write!(f, "ProbeResult({})", ok),
            Self::Error(e) => write!(f, "Error({}: {})", e.code(), e),
        }
    }
}
