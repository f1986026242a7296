//! Certificate/key loading from disk and assembly of the `rustls` configs
//! handed to `tunnel-proto`'s endpoints. Grounded on
//! `original_source/internal/client/client.go`'s `createClientEndpoint` and
//! `internal/server/server.go`'s `createServerEndpoint`.

use std::{fs, io::BufReader, path::Path, sync::Arc};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_platform_verifier::ConfigVerifierExt as _;

pub fn load_certs(path: &Path) -> eyre::Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(Into::into)
}

pub fn load_key(path: &Path) -> eyre::Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| eyre::eyre!("no private key found in {}", path.display()))
}

fn root_store(ca_file: &Path) -> eyre::Result<rustls::RootCertStore> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in load_certs(ca_file)? {
        roots.add(cert)?;
    }
    Ok(roots)
}

/// Accepts any server certificate. Mirrors the Go client's
/// `tls.Config{InsecureSkipVerify: true}` branch, used when `verify_server`
/// is `false`.
#[derive(Debug)]
struct NoServerVerify;

impl rustls::client::danger::ServerCertVerifier for NoServerVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .expect("crypto provider installed in main")
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Builds the client's TLS config. When `verify_server` is `false` the peer
/// certificate is accepted unconditionally (matching the Go client's
/// `InsecureSkipVerify`); when `true`, `ca_file` pins a root store, falling
/// back to the platform's trust store via `rustls-platform-verifier`.
pub fn build_client_tls_config(
    verify_server: bool,
    ca_file: Option<&Path>,
    cert_file: Option<&Path>,
    key_file: Option<&Path>,
) -> eyre::Result<rustls::ClientConfig> {
    let client_cert = match (cert_file, key_file) {
        (Some(cert_file), Some(key_file)) => Some((load_certs(cert_file)?, load_key(key_file)?)),
        _ => None,
    };

    let mut config = if !verify_server {
        let builder = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoServerVerify));
        match client_cert {
            Some((certs, key)) => builder.with_client_auth_cert(certs, key)?,
            None => builder.with_no_client_auth(),
        }
    } else if let Some(ca_file) = ca_file {
        let builder = rustls::ClientConfig::builder().with_root_certificates(root_store(ca_file)?);
        match client_cert {
            Some((certs, key)) => builder.with_client_auth_cert(certs, key)?,
            None => builder.with_no_client_auth(),
        }
    } else {
        rustls::ClientConfig::with_platform_verifier()?
    };

    config.alpn_protocols = vec![tunnel_proto::tls::ALPN.as_bytes().to_vec()];
    Ok(config)
}

/// Builds the server's TLS config. Loads `cert_file`/`key_file` if given,
/// otherwise falls back to a self-signed certificate (matching the Go
/// server's `generateTLSConfig`). `verify_client` requires `ca_file`.
pub fn build_server_tls_config(
    cert_file: Option<&Path>,
    key_file: Option<&Path>,
    ca_file: Option<&Path>,
    verify_client: bool,
) -> eyre::Result<rustls::ServerConfig> {
    let (certs, key) = match (cert_file, key_file) {
        (Some(cert_file), Some(key_file)) => (load_certs(cert_file)?, load_key(key_file)?),
        _ => {
            tracing::warn!("no server certificate configured, generating a self-signed one");
            tunnel_proto::tls::self_signed_cert(vec!["localhost".to_string()])?
        }
    };

    let mut config = if verify_client {
        let ca_file = ca_file.ok_or_else(|| eyre::eyre!("verify_client requires a ca_file"))?;
        let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(root_store(ca_file)?)).build()?;
        rustls::ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)?
    } else {
        rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?
    };

    config.alpn_protocols = vec![tunnel_proto::tls::ALPN.as_bytes().to_vec()];
    Ok(config)
}
