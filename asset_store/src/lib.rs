//! Inventory store boundary: the [`Repository`] trait, its backends, and
//! the reconcile module that computes component change lists.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use asset_model::{Asset, StoreKind};
use shared_config::Config;

mod csv_store;
mod fleetdb;
mod mock;
pub mod reconcile;

pub use csv_store::CsvStore;
pub use fleetdb::FleetdbStore;
pub use mock::MockStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported store kind: {0}")]
    UnsupportedKind(String),

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("csv store: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv record {line}: {msg}")]
    BadRecord { line: u64, msg: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("fleetdb api: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The pluggable inventory store. Backends must be safe for concurrent
/// use; the worker shares one instance across all dispatched tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Look up one asset by its store identifier. BMC credentials are
    /// only populated when `fetch_credentials` is set.
    async fn asset_by_id(&self, id: &str, fetch_credentials: bool) -> Result<Asset, StoreError>;

    /// Paginated asset listing. Returns the page and the total count of
    /// assets in the store.
    async fn assets_by_offset_limit(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Asset>, usize), StoreError>;

    /// Upsert collected data for the asset.
    async fn asset_update(&self, asset: &Asset) -> Result<(), StoreError>;
}

impl std::fmt::Debug for dyn Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("kind", &self.kind()).finish()
    }
}

/// Construct the repository backend for the configured store kind.
/// Unknown kinds fail here, before anything else starts.
pub fn new_repository(kind: &str, cfg: &Config) -> Result<Arc<dyn Repository>, StoreError> {
    let kind =
        StoreKind::from_str(kind).map_err(|e| StoreError::UnsupportedKind(e.0))?;

    match kind {
        StoreKind::Fleetdb => Ok(Arc::new(FleetdbStore::new(
            &cfg.fleetdb_url,
            cfg.fleetdb_auth_token.clone(),
        )?)),
        StoreKind::Csv => Ok(Arc::new(CsvStore::from_file(&cfg.csv_file)?)),
        StoreKind::Mock => Ok(MockStore::new(10)),
    }
}
