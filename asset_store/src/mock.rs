//! In-memory store backend used by tests and the `mock` store kind.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use asset_model::{Asset, StoreKind};

use crate::{Repository, StoreError};

pub struct MockStore {
    assets: Mutex<BTreeMap<String, Asset>>,
    updates: AtomicUsize,
}

impl MockStore {
    /// A store pre-seeded with `count` assets carrying loopback BMC
    /// credentials and undetermined identity attributes.
    pub fn new(count: usize) -> Arc<Self> {
        let store = Arc::new(Self {
            assets: Mutex::new(BTreeMap::new()),
            updates: AtomicUsize::new(0),
        });

        for idx in 0..count {
            let mut asset = Asset::new(format!("mock-{idx}"));
            asset.bmc_address = Some("127.0.0.1".parse::<IpAddr>().unwrap());
            asset.bmc_username = "root".to_string();
            asset.bmc_password = "calvin".to_string();
            store.seed(asset);
        }

        store
    }

    /// Insert or replace an asset record directly, bypassing the update
    /// counter. Test setup helper.
    pub fn seed(&self, asset: Asset) {
        self.assets
            .lock()
            .unwrap()
            .insert(asset.id.clone(), asset);
    }

    /// Number of `asset_update` calls that reached this store.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for MockStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Mock
    }

    async fn asset_by_id(&self, id: &str, fetch_credentials: bool) -> Result<Asset, StoreError> {
        let assets = self.assets.lock().unwrap();
        let mut asset = assets
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if !fetch_credentials {
            asset.bmc_username.clear();
            asset.bmc_password.clear();
        }

        Ok(asset)
    }

    async fn assets_by_offset_limit(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Asset>, usize), StoreError> {
        let assets = self.assets.lock().unwrap();
        let total = assets.len();
        let page = assets.values().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }

    async fn asset_update(&self, asset: &Asset) -> Result<(), StoreError> {
        self.assets
            .lock()
            .unwrap()
            .insert(asset.id.clone(), asset.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paging_reports_total() {
        let store = MockStore::new(10);
        let (page, total) = store.assets_by_offset_limit(0, 3).await.unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(total, 10);

        let (rest, total) = store.assets_by_offset_limit(8, 5).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn credentials_withheld_unless_requested() {
        let store = MockStore::new(1);
        let without = store.asset_by_id("mock-0", false).await.unwrap();
        assert!(without.bmc_password.is_empty());

        let with = store.asset_by_id("mock-0", true).await.unwrap();
        assert_eq!(with.bmc_password, "calvin");
    }

    #[tokio::test]
    async fn missing_asset_is_not_found() {
        let store = MockStore::new(1);
        let err = store.asset_by_id("absent", true).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
