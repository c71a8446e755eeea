//! TLS material for the QUIC endpoint.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::warn;

use crate::config::TlsConfig;

/// Build the server TLS config from PEM files, or from a freshly generated
/// self-signed certificate for `node_id` when none are configured.
pub fn server_tls_config(tls: Option<&TlsConfig>, node_id: &str) -> Result<rustls::ServerConfig> {
    let (certs, key) = match tls {
        Some(tls) => load_pem(&tls.cert, &tls.key)?,
        None => {
            warn!("no TLS certificate configured, generating a self-signed one");
            self_signed(node_id)?
        }
    };

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .context("Failed to select TLS 1.3")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Invalid certificate or private key")?;
    Ok(config)
}

fn load_pem(
    cert: &Path,
    key: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let mut reader = BufReader::new(
        File::open(cert).with_context(|| format!("Failed to open {}", cert.display()))?,
    );
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificates in {}", cert.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("no certificate found in {}", cert.display()));
    }

    let mut reader = BufReader::new(
        File::open(key).with_context(|| format!("Failed to open {}", key.display()))?,
    );
    let key = rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("Failed to parse private key in {}", key.display()))?
        .ok_or_else(|| anyhow!("no private key found in {}", key.display()))?;
    Ok((certs, key))
}

fn self_signed(node_id: &str) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_owned(), node_id.to_owned()])?;
    let cert_der = CertificateDer::from(cert.serialize_der()?);
    let key = PrivatePkcs8KeyDer::from(cert.serialize_private_key_der());
    Ok((vec![cert_der], PrivateKeyDer::Pkcs8(key)))
}
