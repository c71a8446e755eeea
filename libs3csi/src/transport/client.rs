//! QUIC client for talking to a node plugin, used by tooling and tests that
//! act as the orchestrator.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use quinn::crypto::rustls::QuicClientConfig;
use tracing::{debug, instrument};

use super::MAX_MESSAGE_SIZE;
use crate::error::CsiError;
use crate::message::CsiMessage;

/// One QUIC connection to a node plugin. Every request runs on its own
/// bi-directional stream, so a client can be shared between tasks.
pub struct CsiClient {
    endpoint: quinn::Endpoint,
    connection: quinn::Connection,
}

impl CsiClient {
    /// Connect to the plugin at `addr`. `server_name` must match a SAN of
    /// the plugin's certificate.
    pub async fn connect(
        addr: SocketAddr,
        server_name: &str,
        tls_config: rustls::ClientConfig,
    ) -> Result<Self, CsiError> {
        let crypto = QuicClientConfig::try_from(tls_config)
            .map_err(|e| CsiError::TransportError(format!("TLS config unusable for QUIC: {e}")))?;

        // Bind in the family of the peer, an IPv4 socket cannot reach `::1`.
        let local = if addr.is_ipv6() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };
        let mut endpoint = quinn::Endpoint::client(local).map_err(CsiError::transport)?;
        endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(crypto)));

        let connection = endpoint
            .connect(addr, server_name)
            .map_err(CsiError::transport)?
            .await
            .map_err(CsiError::transport)?;
        debug!(%addr, %server_name, "connected to node plugin");

        Ok(Self {
            endpoint,
            connection,
        })
    }

    /// Send `msg` and return whatever the plugin answered, including
    /// [`CsiMessage::Error`] replies.
    #[instrument(skip(self), fields(msg = %msg))]
    pub async fn request(&self, msg: &CsiMessage) -> Result<CsiMessage, CsiError> {
        let payload = serde_json::to_vec(msg).map_err(CsiError::internal)?;
        let reply = self.exchange(&payload).await?;
        let response: CsiMessage = serde_json::from_slice(&reply)
            .map_err(|e| CsiError::TransportError(format!("undecodable reply: {e}")))?;
        debug!(%response, "reply received");
        Ok(response)
    }

    /// Like [`Self::request`], but an error reply becomes `Err` so callers
    /// can use `?` on the plugin's verdict.
    pub async fn call(&self, msg: &CsiMessage) -> Result<CsiMessage, CsiError> {
        match self.request(msg).await? {
            CsiMessage::Error(e) => Err(e),
            other => Ok(other),
        }
    }

    /// Write raw bytes on a fresh stream and read the raw reply.
    async fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>, CsiError> {
        let (mut send, mut recv) = self.connection.open_bi().await.map_err(CsiError::transport)?;
        send.write_all(payload).await.map_err(CsiError::transport)?;
        send.finish().map_err(CsiError::transport)?;
        recv.read_to_end(MAX_MESSAGE_SIZE)
            .await
            .map_err(CsiError::transport)
    }

    /// Close the connection and wait until the peer has been told.
    pub async fn close(self) {
        self.connection
            .close(quinn::VarInt::from_u32(0), b"client shutdown");
        self.endpoint.wait_idle().await;
    }
}
