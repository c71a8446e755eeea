//! # libs3csi — CSI node service for S3 buckets
//!
//! `libs3csi` implements the node half of a [Container Storage Interface][csi]
//! plugin that publishes S3-compatible object storage buckets as FUSE mounts
//! (via `s3fs`).  Requests travel over QUIC (via [`quinn`]) instead of gRPC,
//! following the RK8s conventions (Tokio async runtime, `tracing` for
//! observability, `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: requests, capabilities, node info. |
//! | [`error`] | [`CsiError`] enum and its RPC status [`Code`]. |
//! | [`message`] | [`CsiMessage`] protocol envelope for QUIC transport. |
//! | [`identity`] | [`CsiIdentity`] trait — plugin discovery & health. |
//! | [`node`] | [`CsiNode`] trait — stage, publish, unpublish, unstage. |
//! | [`mount`] | Mount / unmount providers and mount point detection. |
//! | [`backend`] | The S3 node service built on those providers. |
//! | [`transport`] | QUIC client/server built on `quinn`. |
//!
//! [csi]: https://github.com/container-storage-interface/spec

pub mod backend;
pub mod error;
pub mod identity;
pub mod message;
pub mod mount;
pub mod node;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use backend::s3::{NodeOptions, S3Backend};
pub use error::{Code, CsiError};
pub use identity::CsiIdentity;
pub use message::CsiMessage;
pub use node::CsiNode;
pub use transport::{client::CsiClient, server::CsiServer};
pub use types::*;
