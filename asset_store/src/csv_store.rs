//! CSV-file store backend.
//!
//! Used for one-off collection runs against a flat file of BMC
//! credentials. Updates are kept in memory only; the file itself is
//! never rewritten.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use asset_model::{Asset, StoreKind};

use crate::{Repository, StoreError};

/// One row of the asset CSV file.
#[derive(Debug, Deserialize)]
struct Row {
    id: String,
    bmc_address: String,
    bmc_username: String,
    bmc_password: String,
    #[serde(default)]
    vendor: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    serial: String,
}

#[derive(Debug)]
pub struct CsvStore {
    assets: Mutex<BTreeMap<String, Asset>>,
}

impl CsvStore {
    pub fn from_file(path: &str) -> Result<Self, StoreError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, StoreError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut assets = BTreeMap::new();

        for (idx, record) in csv_reader.deserialize::<Row>().enumerate() {
            let row = record?;
            // Header is line 1, first record line 2.
            let line = idx as u64 + 2;

            let address: IpAddr =
                row.bmc_address
                    .parse()
                    .map_err(|_| StoreError::BadRecord {
                        line,
                        msg: format!("invalid BMC address: {}", row.bmc_address),
                    })?;

            if row.bmc_username.is_empty() || row.bmc_password.is_empty() {
                return Err(StoreError::BadRecord {
                    line,
                    msg: "BMC credentials empty".to_string(),
                });
            }

            let mut asset = Asset::new(row.id);
            asset.bmc_address = Some(address);
            asset.bmc_username = row.bmc_username;
            asset.bmc_password = row.bmc_password;
            if !row.vendor.is_empty() {
                asset.vendor = row.vendor;
            }
            if !row.model.is_empty() {
                asset.model = row.model;
            }
            if !row.serial.is_empty() {
                asset.serial = row.serial;
            }

            assets.insert(asset.id.clone(), asset);
        }

        Ok(Self {
            assets: Mutex::new(assets),
        })
    }
}

#[async_trait]
impl Repository for CsvStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Csv
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
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
id,bmc_address,bmc_username,bmc_password,vendor,model,serial
srv-1,10.1.2.3,admin,hunter2,dell,r640,S1
srv-2,10.1.2.4,admin,hunter2,,,
";

    #[tokio::test]
    async fn parses_rows_into_assets() {
        let store = CsvStore::from_reader(SAMPLE.as_bytes()).unwrap();
        let asset = store.asset_by_id("srv-1", true).await.unwrap();
        assert_eq!(asset.bmc_address.unwrap().to_string(), "10.1.2.3");
        assert_eq!(asset.bmc_password, "hunter2");
        assert_eq!(asset.vendor, "dell");

        // Blank identity columns stay at the placeholder.
        let other = store.asset_by_id("srv-2", true).await.unwrap();
        assert_eq!(other.vendor, asset_model::UNKNOWN);
    }

    #[test]
    fn rejects_bad_bmc_address() {
        let bad = "id,bmc_address,bmc_username,bmc_password\nsrv-1,not-an-ip,a,b\n";
        let err = CsvStore::from_reader(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::BadRecord { line: 2, .. }));
    }

    #[test]
    fn rejects_missing_credentials() {
        let bad = "id,bmc_address,bmc_username,bmc_password\nsrv-1,10.0.0.1,,\n";
        let err = CsvStore::from_reader(bad.as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::BadRecord { .. }));
    }
}
