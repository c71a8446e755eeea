//! QUIC server that runs on each worker node and dispatches incoming CSI
//! requests to the appropriate trait implementations.

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::crypto::rustls::QuicServerConfig;
use tracing::{debug, error, info, instrument, warn};

use super::MAX_MESSAGE_SIZE;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::message::CsiMessage;
use crate::node::CsiNode;

/// A CSI server that accepts QUIC connections and dispatches
/// [`CsiMessage`] requests to a [`CsiIdentity`] + [`CsiNode`]
/// implementation.
pub struct CsiServer<T> {
    endpoint: quinn::Endpoint,
    handler: Arc<T>,
}

impl<T> CsiServer<T>
where
    T: CsiIdentity + CsiNode + 'static,
{
    /// Create a new server bound to `addr`.
    ///
    /// `tls_config` must allow TLS 1.3, which QUIC requires.
    pub fn new(
        addr: SocketAddr,
        tls_config: rustls::ServerConfig,
        handler: Arc<T>,
    ) -> Result<Self, CsiError> {
        let quic_server_config = QuicServerConfig::try_from(tls_config)
            .map_err(|e| CsiError::TransportError(format!("invalid TLS config: {e}")))?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_server_config));
        let endpoint = quinn::Endpoint::server(server_config, addr).map_err(CsiError::transport)?;
        info!(%addr, "CSI QUIC server listening");
        Ok(Self { endpoint, handler })
    }

    /// Accept connections in a loop until the endpoint is closed.
    ///
    /// Each accepted connection spawns a Tokio task, and each bi-stream
    /// within a connection is handled concurrently.  Lifecycle calls are
    /// still serialized by the handler.
    pub async fn serve(&self) -> Result<(), CsiError> {
        while let Some(incoming) = self.endpoint.accept().await {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                match incoming.await {
                    Ok(conn) => {
                        let remote = conn.remote_address();
                        debug!(%remote, "CSI connection accepted");
                        if let Err(e) = Self::handle_connection(conn, handler).await {
                            warn!(%remote, error = %e, "CSI connection error");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "CSI incoming connection failed");
                    }
                }
            });
        }
        Ok(())
    }

    /// Handle all bi-streams on a single connection.
    async fn handle_connection(conn: quinn::Connection, handler: Arc<T>) -> Result<(), CsiError> {
        loop {
            let (send, recv) = match conn.accept_bi().await {
                Ok(stream) => stream,
                Err(quinn::ConnectionError::ApplicationClosed(_)) => return Ok(()),
                Err(e) => return Err(CsiError::transport(e)),
            };

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = Self::handle_stream(send, recv, &handler).await {
                    error!(error = %e, "CSI stream handler error");
                }
            });
        }
    }

    /// Process a single bi-stream: read request → dispatch → write response.
    #[instrument(skip_all)]
    async fn handle_stream(
        mut send: quinn::SendStream,
        mut recv: quinn::RecvStream,
        handler: &T,
    ) -> Result<(), CsiError> {
        let buf = recv
            .read_to_end(MAX_MESSAGE_SIZE)
            .await
            .map_err(CsiError::transport)?;

        let response = match serde_json::from_slice::<CsiMessage>(&buf) {
            Ok(request) => {
                debug!(%request, "CSI request received");
                Self::dispatch(handler, request).await
            }
            Err(e) => {
                warn!(error = %e, "malformed CSI request");
                CsiMessage::Error(CsiError::InvalidArgument(format!("malformed request: {e}")))
            }
        };
        debug!(%response, "CSI response ready");

        let payload = serde_json::to_vec(&response).map_err(CsiError::internal)?;
        send.write_all(&payload)
            .await
            .map_err(CsiError::transport)?;
        send.finish().map_err(CsiError::transport)?;
        Ok(())
    }

    /// Map a [`CsiMessage`] request to the correct trait method call and
    /// wrap the result in a response [`CsiMessage`].
    async fn dispatch(handler: &T, request: CsiMessage) -> CsiMessage {
        fn ack(result: Result<(), CsiError>) -> CsiMessage {
            match result {
                Ok(()) => CsiMessage::Ok,
                Err(e) => CsiMessage::Error(e),
            }
        }

        match request {
            // --- Identity ---------------------------------------------------
            CsiMessage::Probe => match handler.probe().await {
                Ok(ok) => CsiMessage::ProbeResult(ok),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetPluginInfo => match handler.get_plugin_info().await {
                Ok(info) => CsiMessage::PluginInfoResponse(info),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetPluginCapabilities => match handler.get_plugin_capabilities().await {
                Ok(caps) => CsiMessage::PluginCapabilitiesResponse(caps),
                Err(e) => CsiMessage::Error(e),
            },

            // --- Node -------------------------------------------------------
            CsiMessage::StageVolume(req) => ack(handler.stage_volume(req).await),
            CsiMessage::UnstageVolume {
                volume_id,
                staging_target_path,
            } => ack(
                handler
                    .unstage_volume(&volume_id, &staging_target_path)
                    .await,
            ),
            CsiMessage::PublishVolume(req) => ack(handler.publish_volume(req).await),
            CsiMessage::UnpublishVolume {
                volume_id,
                target_path,
            } => ack(handler.unpublish_volume(&volume_id, &target_path).await),
            CsiMessage::GetNodeCapabilities => match handler.get_capabilities().await {
                Ok(caps) => CsiMessage::NodeCapabilitiesResponse(caps),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::ExpandVolume(req) => ack(handler.expand_volume(req).await),
            CsiMessage::GetVolumeStats {
                volume_id,
                volume_path,
            } => match handler.get_volume_stats(&volume_id, &volume_path).await {
                Ok(stats) => CsiMessage::VolumeStatsResponse(stats),
                Err(e) => CsiMessage::Error(e),
            },
            CsiMessage::GetNodeInfo => match handler.get_info().await {
                Ok(info) => CsiMessage::NodeInfoResponse(info),
                Err(e) => CsiMessage::Error(e),
            },

            // --- Response variants should never arrive as requests ----------
            other => {
                warn!(msg = %other, "unexpected message variant received as request");
                CsiMessage::Error(CsiError::InvalidArgument(format!(
                    "unexpected message: {other}"
                )))
            }
        }
    }

    /// Return a reference to the underlying QUIC endpoint, useful for
    /// obtaining the local address or shutting down.
    pub fn endpoint(&self) -> &quinn::Endpoint {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::s3::{NodeOptions, S3Backend};
    use crate::error::Code;
    use crate::types::*;

    fn backend() -> S3Backend {
        S3Backend::new(NodeOptions {
            plugin_name: "s3.csi.test".into(),
            node_id: "node-01".into(),
            max_volumes: 16,
        })
    }

    async fn dispatch(msg: CsiMessage) -> CsiMessage {
        CsiServer::<S3Backend>::dispatch(&backend(), msg).await
    }

    #[tokio::test]
    async fn dispatches_node_queries() {
        match dispatch(CsiMessage::GetNodeCapabilities).await {
            CsiMessage::NodeCapabilitiesResponse(caps) => {
                assert_eq!(caps, vec![NodeServiceCapability::GetVolumeStats]);
            }
            other => panic!("unexpected response {other}"),
        }
        match dispatch(CsiMessage::GetNodeInfo).await {
            CsiMessage::NodeInfoResponse(info) => {
                assert_eq!(info.node_id, "node-01");
                assert_eq!(info.max_volumes, 16);
            }
            other => panic!("unexpected response {other}"),
        }
        assert!(matches!(
            dispatch(CsiMessage::Probe).await,
            CsiMessage::ProbeResult(true)
        ));
    }

    #[tokio::test]
    async fn errors_travel_as_error_messages() {
        let response = dispatch(CsiMessage::ExpandVolume(NodeExpandVolumeRequest::default())).await;
        let CsiMessage::Error(e) = response else {
            panic!("expected error, got {response}");
        };
        assert_eq!(e.code(), Code::Unimplemented);

        let response = dispatch(CsiMessage::PublishVolume(NodePublishVolumeRequest::default())).await;
        let CsiMessage::Error(e) = response else {
            panic!("expected error, got {response}");
        };
        assert_eq!(e.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn stage_acknowledges() {
        let response = dispatch(CsiMessage::StageVolume(NodeStageVolumeRequest {
            volume_id: "vol-1".into(),
            staging_target_path: "/stage/a".into(),
            volume_capability: Some(VolumeCapability::default()),
            ..Default::default()
        }))
        .await;
        assert!(matches!(response, CsiMessage::Ok));
    }

    #[tokio::test]
    async fn response_variants_are_rejected() {
        let response = dispatch(CsiMessage::Ok).await;
        let CsiMessage::Error(e) = response else {
            panic!("expected error, got {response}");
        };
        assert_eq!(e.code(), Code::InvalidArgument);
    }
}
