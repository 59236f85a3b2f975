//! Client TLS setup for mutually-authenticated NATS connections.

use std::fs::File;
use std::io::BufReader;

use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore};
use rustls_pemfile::{certs, pkcs8_private_keys};

use crate::EventsError;

pub(crate) fn client_config(
    ca_cert_path: &str,
    client_cert_path: &str,
    client_key_path: &str,
) -> Result<ClientConfig, EventsError> {
    let mut root_store = RootCertStore::empty();
    let mut ca_reader = BufReader::new(File::open(ca_cert_path)?);
    for cert in certs(&mut ca_reader)? {
        root_store
            .add(&Certificate(cert))
            .map_err(|e| EventsError::Tls(e.to_string()))?;
    }

    let client_certs: Vec<Certificate> = certs(&mut BufReader::new(File::open(client_cert_path)?))?
        .into_iter()
        .map(Certificate)
        .collect();

    let mut keys = pkcs8_private_keys(&mut BufReader::new(File::open(client_key_path)?))?;
    let key = match keys.pop() {
        Some(key) => PrivateKey(key),
        None => {
            return Err(EventsError::Tls(format!(
                "no pkcs8 private key in {client_key_path}"
            )))
        }
    };

    ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_client_auth_cert(client_certs, key)
        .map_err(|e| EventsError::Tls(e.to_string()))
}
