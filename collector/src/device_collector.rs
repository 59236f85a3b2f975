//! Out-of-band collection cycle for one asset.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use asset_model::{stage, Asset};
use asset_store::reconcile::{compute_change_list, merge_scalar_attributes};
use asset_store::{Repository, StoreError};

use crate::queryor::BmcQueryor;
use crate::CollectorError;

/// Side-effect hook invoked once per asset with the finalized record,
/// accumulated errors included, whether or not a store write happened.
pub type OutputFn = Arc<dyn Fn(&Asset) + Send + Sync>;

/// Output hook that dumps the finalized asset as JSON to stdout.
pub fn stdout_output() -> OutputFn {
    Arc::new(|asset: &Asset| match serde_json::to_string_pretty(asset) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(asset_id = %asset.id, error = %e, "asset serialization failed"),
    })
}

pub struct DeviceCollector {
    repository: Arc<dyn Repository>,
    queryor: Arc<dyn BmcQueryor>,
    facility: String,
}

impl DeviceCollector {
    pub fn new(
        repository: Arc<dyn Repository>,
        queryor: Arc<dyn BmcQueryor>,
        facility: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            queryor,
            facility: facility.into(),
        }
    }

    /// Run one full collection-and-reconcile cycle for the asset.
    ///
    /// Per-stage failures are recorded in `asset.errors` and the cycle
    /// continues where partial progress is still useful; the store is
    /// written at most once, and only when the reconcile step found an
    /// actual difference. The output hook always runs.
    pub async fn collect_outofband(
        &self,
        cancel: &CancellationToken,
        asset: &mut Asset,
        output: &OutputFn,
    ) -> Result<(), CollectorError> {
        asset.reset_errors();
        if asset.facility.is_empty() {
            asset.facility = self.facility.clone();
        }

        // Resolve the current store record, and BMC credentials with it
        // unless the asset already carries them (csv-sourced runs).
        let fetch_credentials = !asset.has_bmc_credentials();
        let current = match self.repository.asset_by_id(&asset.id, fetch_credentials).await {
            Ok(record) => Some(record),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                asset.include_error(stage::STORE, e.to_string());
                output(asset);
                return Err(e.into());
            }
        };

        if let Some(record) = &current {
            asset.vendor = record.vendor.clone();
            asset.model = record.model.clone();
            asset.serial = record.serial.clone();
            asset.metadata = record.metadata.clone();
            if fetch_credentials {
                asset.bmc_address = record.bmc_address;
                asset.bmc_username = record.bmc_username.clone();
                asset.bmc_password = record.bmc_password.clone();
            }
        }

        if !asset.has_bmc_credentials() {
            asset.include_error(stage::CREDENTIALS, "BMC address or credentials missing");
            output(asset);
            return Err(CollectorError::MissingCredentials(asset.id.clone()));
        }

        if self.cancelled(cancel, asset) {
            output(asset);
            return Ok(());
        }

        match self.queryor.inventory(asset).await {
            Ok(device) => asset.inventory = Some(device),
            Err(e) => {
                tracing::warn!(asset_id = %asset.id, error = %e, "inventory collection failed");
                asset.include_error(stage::COLLECT, e.to_string());
            }
        }

        match self.queryor.bios_config(asset).await {
            Ok(config) => asset.bios_config = config,
            Err(e) => asset.include_error(stage::BIOSCFG, e.to_string()),
        }

        // Without an inventory document there is nothing to reconcile.
        let Some(device) = asset.inventory.clone() else {
            output(asset);
            return Ok(());
        };

        if self.cancelled(cancel, asset) {
            output(asset);
            return Ok(());
        }

        let empty = Vec::new();
        let current_components = current.as_ref().map_or(&empty, |r| &r.components);
        let change_set = match compute_change_list(current_components, &device.components) {
            Ok(change_set) => change_set,
            Err(e) => {
                // No partial change set is ever applied.
                asset.include_error(stage::RECONCILE, e.to_string());
                output(asset);
                return Ok(());
            }
        };

        let collected = HashMap::from([
            ("vendor".to_string(), device.vendor.clone()),
            ("model".to_string(), device.model.clone()),
            ("serial".to_string(), device.serial.clone()),
        ]);
        let current_attrs = current
            .as_ref()
            .map(Asset::scalar_attributes)
            .unwrap_or_default();
        let merged = merge_scalar_attributes(&collected, &current_attrs);
        let scalars_changed = merged.is_some();
        if let Some(attrs) = &merged {
            asset.set_scalar_attributes(attrs);
        }

        if self.cancelled(cancel, asset) {
            output(asset);
            return Ok(());
        }

        asset.components = device.components.clone();
        if !change_set.is_empty() || scalars_changed {
            match self.repository.asset_update(asset).await {
                Ok(()) => tracing::info!(
                    asset_id = %asset.id,
                    added = change_set.add.len(),
                    updated = change_set.update.len(),
                    removed = change_set.remove.len(),
                    scalars_changed,
                    "inventory reconciled",
                ),
                Err(e) => asset.include_error(stage::STORE, e.to_string()),
            }
        } else {
            tracing::debug!(asset_id = %asset.id, "inventory unchanged, skipping store write");
        }

        output(asset);
        Ok(())
    }

    fn cancelled(&self, cancel: &CancellationToken, asset: &mut Asset) -> bool {
        if cancel.is_cancelled() {
            asset.include_error(stage::CANCELLED, "collection cycle aborted");
            true
        } else {
            false
        }
    }
}
