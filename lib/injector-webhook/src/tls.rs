//! TLS support for the webhook listener

use anyhow::{anyhow, Context, Result};
use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use rustls_pemfile::{certs, read_all, Item};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// TLS configuration for the HTTPS listener
#[derive(Clone)]
pub struct TlsServerConfig {
    /// Rustls server configuration
    pub config: Arc<ServerConfig>,
}

impl TlsServerConfig {
    /// Create a TLS configuration from PEM-encoded certificate chain and private key
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        debug!("Creating TLS configuration from PEM data");

        let certs_vec = load_certificates(cert_pem)?;
        if certs_vec.is_empty() {
            return Err(anyhow!("No certificates found in PEM data"));
        }
        debug!("Loaded {} certificate(s)", certs_vec.len());

        let private_key = load_private_key(key_pem)?;
        debug!("Loaded private key");

        let mut config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| anyhow!("Failed to select TLS protocol versions: {}", e))?
            .with_no_client_auth()
            .with_single_cert(certs_vec, private_key)
            .map_err(|e| anyhow!("Failed to create TLS config: {}", e))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Create a TLS configuration from certificate and key files
    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert = std::fs::read(cert_path)
            .with_context(|| format!("Failed to read TLS certificate from {}", cert_path.display()))?;
        let key = std::fs::read(key_path)
            .with_context(|| format!("Failed to read TLS key from {}", key_path.display()))?;

        let config = Self::from_pem(&cert, &key)?;
        info!(
            "TLS configuration loaded from {} and {}",
            cert_path.display(),
            key_path.display()
        );
        Ok(config)
    }
}

/// Load certificates from PEM-encoded data
pub fn load_certificates(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem_data);
    certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("Failed to parse certificates: {}", e))
}

/// Load the first PKCS#8, PKCS#1 or SEC1 private key from PEM-encoded data
pub fn load_private_key(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem_data);
    for item in read_all(&mut reader) {
        let item = item.map_err(|e| anyhow!("Failed to parse private key: {}", e))?;
        match item {
            Item::Pkcs8Key(k) => return Ok(PrivateKeyDer::Pkcs8(k)),
            Item::Pkcs1Key(k) => return Ok(PrivateKeyDer::Pkcs1(k)),
            Item::Sec1Key(k) => return Ok(PrivateKeyDer::Sec1(k)),
            _ => {}
        }
    }
    Err(anyhow!("No private key found in PEM data"))
}
