//! Runtime configuration shared by every assayer crate.
//!
//! Values are read once from the environment with sensible defaults and
//! returned as an owned, immutable [`Config`]. CLI flags override fields
//! after construction; nothing in here is a mutable global.

use std::env;
use std::time::Duration;

/// Default bound on concurrent collection tasks.
pub const CONCURRENCY_DEFAULT: usize = 5;

/// Default number of worker replicas coordinating over the lease store.
pub const REPLICA_COUNT_DEFAULT: usize = 3;

/// Default interval between periodic fleet sweeps.
pub const DEFAULT_COLLECT_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Default upper bound on the jitter added to the sweep interval.
pub const DEFAULT_COLLECT_SPLAY: Duration = Duration::from_secs(10 * 60);

/// NATS connection parameters. JWT/nkey and TLS client certificate paths
/// are optional; when unset the client connects without auth (dev setups).
#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub jwt_path: Option<String>,
    pub nkey_path: Option<String>,
    pub ca_cert_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
}

/// Immutable application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Inventory store backend kind ("fleetdb", "csv", "mock").
    pub store_kind: String,
    /// Datacenter facility code this instance serves.
    pub facility_code: String,
    /// CSV asset file, used by the csv store backend.
    pub csv_file: String,
    /// Base URL of the fleet inventory API.
    pub fleetdb_url: String,
    /// Bearer token for the fleet inventory API, if required.
    pub fleetdb_auth_token: Option<String>,
    pub nats: NatsConfig,
    /// Bound on concurrent collection tasks.
    pub concurrency: usize,
    /// Worker replicas coordinating over the lease store.
    pub replica_count: usize,
    /// Interval between periodic fleet sweeps.
    pub collect_interval: Duration,
    /// Upper bound on the jitter added to `collect_interval`.
    pub collect_splay: Duration,
    /// Log level string handed to the tracing subscriber.
    pub log_level: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Build a configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            store_kind: env_or("ASSAYER_STORE", "mock"),
            facility_code: env_or("ASSAYER_FACILITY", "sandbox"),
            csv_file: env_or("ASSAYER_CSV_FILE", "assets.csv"),
            fleetdb_url: env_or("FLEETDB_URL", "http://localhost:8000"),
            fleetdb_auth_token: env_opt("FLEETDB_AUTH_TOKEN"),
            nats: NatsConfig {
                url: env_or("NATS_URL", "nats://127.0.0.1:4222"),
                jwt_path: env_opt("NATS_JWT_PATH"),
                nkey_path: env_opt("NATS_NKEY_PATH"),
                ca_cert_path: env_opt("NATS_CA_CERT_PATH"),
                client_cert_path: env_opt("NATS_CLIENT_CERT_PATH"),
                client_key_path: env_opt("NATS_CLIENT_KEY_PATH"),
            },
            concurrency: CONCURRENCY_DEFAULT,
            replica_count: REPLICA_COUNT_DEFAULT,
            collect_interval: DEFAULT_COLLECT_INTERVAL,
            collect_splay: DEFAULT_COLLECT_SPLAY,
            log_level: env_or("ASSAYER_LOG_LEVEL", "info"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env() {
        let cfg = Config::from_env();
        assert_eq!(cfg.concurrency, CONCURRENCY_DEFAULT);
        assert_eq!(cfg.replica_count, REPLICA_COUNT_DEFAULT);
        assert!(!cfg.facility_code.is_empty());
    }
}
