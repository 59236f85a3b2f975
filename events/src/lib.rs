//! NATS plumbing: client connection, the JetStream condition stream, and
//! the KV lease layer worker replicas coordinate through.

use std::sync::Arc;

use async_nats::ConnectOptions;
use nkeys::KeyPair;

use shared_config::NatsConfig;

mod condition;
mod kv;
mod stream;
mod tls;

pub use condition::{subject, Condition};
pub use kv::{lease_key, LeaseKeeper, LEASE_BUCKET};
pub use stream::{ConditionMessage, ConditionStream};

#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    #[error("nats connect: {0}")]
    Connect(#[from] async_nats::ConnectError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls setup: {0}")]
    Tls(String),

    #[error("nkey: {0}")]
    NKey(String),

    #[error("jetstream: {0}")]
    JetStream(String),

    #[error("no free lease slot for facility {0}")]
    NoLeaseSlot(String),

    #[error("decode condition: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Establish the NATS client connection. JWT/nkey auth and client TLS
/// are applied only when the corresponding paths are configured.
pub async fn connect(cfg: &NatsConfig) -> Result<async_nats::Client, EventsError> {
    let mut options = ConnectOptions::new();

    if let (Some(jwt_path), Some(nkey_path)) = (&cfg.jwt_path, &cfg.nkey_path) {
        let jwt = std::fs::read_to_string(jwt_path)?;
        let seed = std::fs::read_to_string(nkey_path)?;
        let key_pair = Arc::new(
            KeyPair::from_seed(seed.trim()).map_err(|e| EventsError::NKey(e.to_string()))?,
        );

        options = options.jwt(jwt, move |nonce| {
            let key_pair = Arc::clone(&key_pair);
            Box::pin(async move {
                key_pair
                    .sign(&nonce)
                    .map_err(|e| async_nats::AuthError::new(e.to_string()))
            })
        });
    }

    if let (Some(ca), Some(cert), Some(key)) = (
        &cfg.ca_cert_path,
        &cfg.client_cert_path,
        &cfg.client_key_path,
    ) {
        let tls_config = tls::client_config(ca, cert, key)?;
        options = options.require_tls(true).tls_client_config(tls_config);
    }

    let client = async_nats::connect_with_options(cfg.url.as_str(), options).await?;
    tracing::debug!(url = %cfg.url, "nats client connected");
    Ok(client)
}
