//! loads a cert/key pair into a server-side TLS acceptor, for the
//! echo-secure collaborator (the plain `echo` binary accepts raw TCP; this
//! wraps the same session over a TLS stream instead).

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

pub fn load_acceptor(cert_path: &str, key_path: &str) -> std::io::Result<TlsAcceptor> {
    let cert_file = &mut BufReader::new(File::open(cert_path)?);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(cert_file)
        .collect::<Result<_, _>>()?;

    let key_file = &mut BufReader::new(File::open(key_path)?);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(key_file)?
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "no private key found"))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
