//! TLS connector authenticating to the gateway with a client certificate.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use pkcs8::{EncryptedPrivateKeyInfo, der::pem};
use pushwire_common::{connection, tracing};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime},
    },
};

use super::{Connector, GatewayConnection};
use crate::{
    config::ConnectionConfig,
    error::{ConnectionError, ConnectionResult},
};

const ENCRYPTED_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Opens certificate-authenticated TLS connections to one gateway.
///
/// Certificates are parsed once, when the connector is built; every call to
/// [`Connector::connect`] performs a fresh TCP connect and TLS handshake.
pub struct GatewayConnector {
    address: String,
    server_name: ServerName<'static>,
    tls: TlsConnector,
    connect_timeout: Duration,
    poll_timeout: Duration,
}

impl GatewayConnector {
    /// # Errors
    ///
    /// Returns [`ConnectionError::Certificate`] if the certificate chain or the
    /// private key cannot be loaded, or the host is not a valid server name.
    pub fn new(config: &ConnectionConfig) -> ConnectionResult<Self> {
        let certs = load_certs(&config.certificate)?;
        let key = load_key(
            config.private_key.as_deref().unwrap_or(&config.certificate),
            &config.certificate_passphrase,
        )?;

        let builder = ClientConfig::builder();
        let tls = if config.accept_invalid_certs {
            tracing::warn!(
                host = %config.host,
                "Gateway certificate validation is disabled"
            );
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_client_auth_cert(certs, key)
        } else {
            builder
                .with_root_certificates(native_roots())
                .with_client_auth_cert(certs, key)
        }
        .map_err(|e| ConnectionError::Certificate(e.to_string()))?;

        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| ConnectionError::Certificate(format!("Invalid host: {e}")))?;

        Ok(Self {
            address: config.address(),
            server_name,
            tls: TlsConnector::from(Arc::new(tls)),
            connect_timeout: config.connect_timeout(),
            poll_timeout: config.select_timeout(),
        })
    }

    async fn handshake(&self) -> ConnectionResult<TlsStream<TcpStream>> {
        let stream = TcpStream::connect(self.address.as_str())
            .await
            .map_err(|e| self.connect_error(e))?;
        stream.set_nodelay(true).map_err(|e| self.connect_error(e))?;

        self.tls
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(|e| self.connect_error(e))
    }

    fn connect_error(&self, reason: impl ToString) -> ConnectionError {
        ConnectionError::Connect {
            address: self.address.clone(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Debug for GatewayConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnector")
            .field("address", &self.address)
            .field("connect_timeout", &self.connect_timeout)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for GatewayConnector {
    type Transport = GatewayConnection<TlsStream<TcpStream>>;

    async fn connect(&self) -> ConnectionResult<Self::Transport> {
        connection!(self.address, "Connecting to gateway");

        let stream = tokio::time::timeout(self.connect_timeout, self.handshake())
            .await
            .map_err(|_| ConnectionError::Timeout(self.address.clone()))??;

        connection!(self.address, "Connected to gateway");
        Ok(GatewayConnection::new(stream))
    }

    fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    // Unreadable system roots are not fatal as long as the gateway's issuer loads.
    if !certs.errors.is_empty() {
        tracing::warn!(errors = ?certs.errors, "Some root certificates could not be loaded");
    }

    let (added, ignored) = roots.add_parsable_certificates(certs.certs);
    tracing::debug!(added, ignored, "Loaded native root certificates");

    roots
}

fn load_certs(pem: &str) -> ConnectionResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectionError::Certificate(e.to_string()))?;

    if certs.is_empty() {
        return Err(ConnectionError::Certificate(
            "No certificate found in PEM data".to_string(),
        ));
    }

    Ok(certs)
}

fn load_key(pem: &str, passphrase: &str) -> ConnectionResult<PrivateKeyDer<'static>> {
    if let Some(der) = pem_block(pem, ENCRYPTED_KEY_LABEL)? {
        return decrypt_key(&der, passphrase);
    }

    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| ConnectionError::Certificate(e.to_string()))?
        .ok_or_else(|| {
            ConnectionError::Certificate(
                "Unable to find a private key (expected PKCS1, PKCS8, or SEC1)".to_string(),
            )
        })
}

fn decrypt_key(der: &[u8], passphrase: &str) -> ConnectionResult<PrivateKeyDer<'static>> {
    let key_error = |e: &dyn std::fmt::Display| {
        ConnectionError::Certificate(format!("Unable to decrypt private key: {e}"))
    };

    let info = EncryptedPrivateKeyInfo::try_from(der).map_err(|e| key_error(&e))?;
    let secret = info.decrypt(passphrase).map_err(|e| key_error(&e))?;

    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        secret.as_bytes().to_vec(),
    )))
}

/// DER contents of the first `label` block in `pem`.
///
/// Blocks with other labels, and text between blocks, are skipped.
fn pem_block(pem: &str, label: &str) -> ConnectionResult<Option<Vec<u8>>> {
    for block in pem_blocks(pem) {
        if pem::decode_label(block.as_bytes()).is_ok_and(|found| found == label) {
            let (_, der) = pem::decode_vec(block.as_bytes()).map_err(|e| {
                ConnectionError::Certificate(format!("Malformed {label} block: {e}"))
            })?;
            return Ok(Some(der));
        }
    }

    Ok(None)
}

/// Splits `pem` into its encapsulated blocks, one line per armour line and
/// with line endings normalised to `\n`.
fn pem_blocks(pem: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;

    for line in pem.lines().map(str::trim_end) {
        if line.starts_with("-----BEGIN ") {
            current = Some(String::new());
        }
        if let Some(block) = current.as_mut() {
            block.push_str(line);
            block.push('\n');
            if line.starts_with("-----END ") {
                blocks.extend(current.take());
            }
        }
    }

    blocks
}

/// A certificate verifier that accepts all certificates (for test gateways only).
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERTIFICATE: &str = include_str!("../../tests/fixtures/gateway.crt");
    const KEY: &str = include_str!("../../tests/fixtures/gateway.key");
    const ENCRYPTED_KEY: &str = include_str!("../../tests/fixtures/gateway.encrypted.key");
    const PASSPHRASE: &str = "correct-horse";

    fn config(certificate: String, private_key: Option<&str>, passphrase: &str) -> ConnectionConfig {
        let mut config = ConnectionConfig::new("localhost", 2195, certificate, passphrase);
        config.private_key = private_key.map(str::to_string);
        config.accept_invalid_certs = true;
        config
    }

    #[test]
    fn test_bundled_certificate_and_key() {
        let connector = GatewayConnector::new(&config(format!("{CERTIFICATE}{KEY}"), None, ""));
        assert!(connector.is_ok());
    }

    #[test]
    fn test_separate_key() {
        let connector = GatewayConnector::new(&config(CERTIFICATE.to_string(), Some(KEY), ""));
        assert!(connector.is_ok());
    }

    #[test]
    fn test_encrypted_key_with_passphrase() {
        let connector = GatewayConnector::new(&config(
            format!("{CERTIFICATE}{ENCRYPTED_KEY}"),
            None,
            PASSPHRASE,
        ));
        assert!(connector.is_ok());
    }

    #[test]
    fn test_encrypted_key_with_wrong_passphrase() {
        let result = GatewayConnector::new(&config(
            CERTIFICATE.to_string(),
            Some(ENCRYPTED_KEY),
            "wrong",
        ));
        assert!(matches!(result, Err(ConnectionError::Certificate(reason)) if reason.contains("decrypt")));
    }

    #[test]
    fn test_missing_key() {
        let result = GatewayConnector::new(&config(CERTIFICATE.to_string(), None, ""));
        assert!(matches!(result, Err(ConnectionError::Certificate(reason)) if reason.contains("private key")));
    }

    #[test]
    fn test_missing_certificate() {
        let result = GatewayConnector::new(&config(KEY.to_string(), None, ""));
        assert!(matches!(result, Err(ConnectionError::Certificate(reason)) if reason.contains("No certificate")));
    }

    #[test]
    fn test_poll_timeout_from_config() {
        let mut config = config(format!("{CERTIFICATE}{KEY}"), None, "");
        config.select_timeout_ms = 250;

        let connector = GatewayConnector::new(&config).unwrap();
        assert_eq!(connector.poll_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_pem_block() {
        let (_, expected) = pem::decode_vec(ENCRYPTED_KEY.as_bytes()).unwrap();

        let pem = format!("junk\n{CERTIFICATE}{ENCRYPTED_KEY}trailing");
        let der = pem_block(&pem, ENCRYPTED_KEY_LABEL).unwrap();
        assert_eq!(der, Some(expected.clone()));

        let crlf = ENCRYPTED_KEY.replace('\n', "\r\n");
        assert_eq!(pem_block(&crlf, ENCRYPTED_KEY_LABEL).unwrap(), Some(expected));

        assert_eq!(pem_block(KEY, ENCRYPTED_KEY_LABEL).unwrap(), None);
    }

    #[test]
    fn test_pem_block_ignores_label_outside_armour() {
        // The label text appears inline, not as a boundary line
        let pem = format!("see -----BEGIN {ENCRYPTED_KEY_LABEL}----- below\n{KEY}");
        assert_eq!(pem_block(&pem, ENCRYPTED_KEY_LABEL).unwrap(), None);
    }

    #[test]
    fn test_pem_block_rejects_corrupt_base64() {
        let mut lines = ENCRYPTED_KEY.lines().map(str::to_string).collect::<Vec<_>>();
        lines[1].replace_range(..4, "!!!!");
        let corrupt = lines.join("\n");

        let result = pem_block(&corrupt, ENCRYPTED_KEY_LABEL);
        assert!(matches!(
            result,
            Err(ConnectionError::Certificate(reason)) if reason.contains("Malformed")
        ));

        let result = GatewayConnector::new(&config(
            CERTIFICATE.to_string(),
            Some(corrupt.as_str()),
            PASSPHRASE,
        ));
        assert!(result.is_err());
    }
}
