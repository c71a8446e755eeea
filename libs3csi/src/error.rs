//! CSI error types.
//!
//! All errors in the `libs3csi` crate are represented by the [`CsiError`]
//! enum, which derives [`thiserror::Error`] for ergonomic error handling and
//! also implements [`Serialize`]/[`Deserialize`] so errors can travel across
//! the QUIC transport layer.  Every variant maps onto a standard RPC status
//! [`Code`] through [`CsiError::code`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RPC status code reported to the orchestrator alongside an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Code {
    /// A required request field is missing or malformed.
    InvalidArgument,
    /// The referenced volume or path does not exist.
    NotFound,
    /// Probe, mount or unmount failure on the node.
    Internal,
    /// The operation is not supported by this plugin.
    Unimplemented,
    /// The transport could not deliver the call.
    Unavailable,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::NotFound => "NotFound",
            Self::Internal => "Internal",
            Self::Unimplemented => "Unimplemented",
            Self::Unavailable => "Unavailable",
        };
        f.write_str(s)
    }
}

/// Unified error type for CSI operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum CsiError {
    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The volume path named in the request does not exist.
    #[error("volume path {0} not found")]
    VolumeNotFound(String),

    /// A mount operation failed.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Filesystem path where the mount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An unmount operation failed.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Filesystem path where the unmount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The operation is not implemented by this plugin.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// A QUIC / transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CsiError {
    /// Create a [`CsiError::InvalidArgument`] for a required field that is
    /// absent from the request, e.g. `missing("Volume ID")`.
    pub fn missing(field: &str) -> Self {
        Self::InvalidArgument(format!("{field} missing in request"))
    }

    /// Create a [`CsiError::TransportError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: fmt::Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// The RPC status code this error is reported with.
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::VolumeNotFound(_) => Code::NotFound,
            Self::MountFailed { .. } | Self::UnmountFailed { .. } | Self::Internal(_) => {
                Code::Internal
            }
            Self::Unimplemented(_) => Code::Unimplemented,
            Self::TransportError(_) => Code::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CsiError::missing("Volume ID");
        assert_eq!(
            err.to_string(),
            "invalid argument: Volume ID missing in request"
        );
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn provider_failures_are_internal() {
        let mount = CsiError::MountFailed {
            path: "/mnt/a".into(),
            reason: "s3fs exited with status 1".into(),
        };
        let unmount = CsiError::UnmountFailed {
            path: "/mnt/a".into(),
            reason: "device busy".into(),
        };
        assert_eq!(mount.code(), Code::Internal);
        assert_eq!(unmount.code(), Code::Internal);
        assert_eq!(
            CsiError::Unimplemented("NodeExpandVolume".into()).code(),
            Code::Unimplemented
        );
    }

    #[test]
    fn error_serde_roundtrip() {
        let err = CsiError::MountFailed {
            path: "/mnt/test".into(),
            reason: "permission denied".into(),
        };
        let json = serde_json::to_string(&err).expect("serialize");
        let de: CsiError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err.to_string(), de.to_string());
        assert_eq!(de.code(), Code::Internal);
    }
}
