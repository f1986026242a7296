//! QUIC-specific wrapping of an already-built `rustls` config (component
//! C9) and the server endpoint's self-signed TLS fallback (component C8).
//! Loading certificate material from disk is out of scope here — that is
//! `quic-tun`'s job; this module only ever consumes a finished
//! `rustls::ClientConfig` / `rustls::ServerConfig`.

use std::{sync::Arc, time::Duration};

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use snafu::ResultExt;

use crate::error::{QuicCryptoConfigSnafu, SelfSignedCertSnafu, TransportError};

pub const ALPN: &str = "quic-tun";

/// Keep-alive period for the client endpoint's QUIC session (spec.md
/// §4.7, §5).
pub const KEEP_ALIVE: Duration = Duration::from_secs(15);

pub fn quic_client_config(tls: rustls::ClientConfig) -> Result<quinn::ClientConfig, TransportError> {
    let quic_crypto = QuicClientConfig::try_from(tls).context(QuicCryptoConfigSnafu)?;
    let mut config = quinn::ClientConfig::new(Arc::new(quic_crypto));
    let mut transport = quinn::TransportConfig::default();
    transport.keep_alive_interval(Some(KEEP_ALIVE));
    config.transport_config(Arc::new(transport));
    Ok(config)
}

pub fn quic_server_config(tls: rustls::ServerConfig) -> Result<quinn::ServerConfig, TransportError> {
    let quic_crypto = QuicServerConfig::try_from(tls).context(QuicCryptoConfigSnafu)?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(quic_crypto)))
}

/// Self-signed certificate/key pair used by the server endpoint when no
/// certificate is configured, grounded on the Go `generateTLSConfig`
/// (`internal/server/server.go`) via the idiomatic `rcgen` equivalent.
pub fn self_signed_cert(
    subject_alt_names: Vec<String>,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TransportError> {
    let certified_key =
        rcgen::generate_simple_self_signed(subject_alt_names).context(SelfSignedCertSnafu)?;
    let cert_der = CertificateDer::from(certified_key.cert);
    let key_der = PrivatePkcs8KeyDer::from(certified_key.key_pair.serialize_der());
    Ok((vec![cert_der], PrivateKeyDer::Pkcs8(key_der)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_cert_is_generated() {
        let (certs, _key) = self_signed_cert(vec!["localhost".to_string()]).unwrap();
        assert_eq!(certs.len(), 1);
    }
}
