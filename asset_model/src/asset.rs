use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::component::{Component, Device};
use crate::UNKNOWN;

/// One managed server tracked in the inventory store.
#[derive(Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Store-assigned identifier, immutable once set.
    pub id: String,
    pub vendor: String,
    pub model: String,
    pub serial: String,
    /// Datacenter facility code, supplied by configuration.
    pub facility: String,
    #[serde(default)]
    pub bmc_address: Option<IpAddr>,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub bmc_username: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub bmc_password: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub bios_config: HashMap<String, String>,
    /// Per-stage errors accumulated over one collection cycle,
    /// keyed by pipeline stage name. Reported, not raised.
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
    /// Freshly collected inventory, set by the collector.
    #[serde(default)]
    pub inventory: Option<Device>,
    /// The store's current component records for this asset.
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Asset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vendor: UNKNOWN.to_string(),
            model: UNKNOWN.to_string(),
            serial: UNKNOWN.to_string(),
            facility: String::new(),
            bmc_address: None,
            bmc_username: String::new(),
            bmc_password: String::new(),
            metadata: HashMap::new(),
            bios_config: HashMap::new(),
            errors: BTreeMap::new(),
            inventory: None,
            components: Vec::new(),
        }
    }

    /// Record an error for the given pipeline stage. Existing entries for
    /// other stages are kept; the cycle continues.
    pub fn include_error(&mut self, stage: &str, value: impl Into<String>) {
        self.errors.insert(stage.to_string(), value.into());
    }

    /// Clear accumulated errors at the start of a new collection cycle.
    pub fn reset_errors(&mut self) {
        self.errors.clear();
    }

    pub fn has_bmc_credentials(&self) -> bool {
        self.bmc_address.is_some()
            && !self.bmc_username.is_empty()
            && !self.bmc_password.is_empty()
    }

    /// The identity scalars the merge in the reconcile step operates on.
    pub fn scalar_attributes(&self) -> HashMap<String, String> {
        HashMap::from([
            ("vendor".to_string(), self.vendor.clone()),
            ("model".to_string(), self.model.clone()),
            ("serial".to_string(), self.serial.clone()),
        ])
    }

    /// Apply merged scalar attributes back onto the asset.
    pub fn set_scalar_attributes(&mut self, attrs: &HashMap<String, String>) {
        if let Some(v) = attrs.get("vendor") {
            self.vendor = v.clone();
        }
        if let Some(v) = attrs.get("model") {
            self.model = v.clone();
        }
        if let Some(v) = attrs.get("serial") {
            self.serial = v.clone();
        }
    }
}

// Credentials are deliberately left out of the Debug output.
impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("id", &self.id)
            .field("vendor", &self.vendor)
            .field("model", &self.model)
            .field("serial", &self.serial)
            .field("facility", &self.facility)
            .field("bmc_address", &self.bmc_address)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_asset_defaults_to_unknown_identity() {
        let asset = Asset::new("a1");
        assert_eq!(asset.vendor, UNKNOWN);
        assert_eq!(asset.model, UNKNOWN);
        assert_eq!(asset.serial, UNKNOWN);
    }

    #[test]
    fn errors_accumulate_across_stages() {
        let mut asset = Asset::new("a1");
        asset.include_error("collect", "bmc unreachable");
        asset.include_error("store", "write failed");
        assert_eq!(asset.errors.len(), 2);
        asset.reset_errors();
        assert!(asset.errors.is_empty());
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let mut asset = Asset::new("a1");
        asset.bmc_username = "admin".to_string();
        asset.bmc_password = "hunter2".to_string();
        let out = format!("{asset:?}");
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("admin"));
    }

    #[test]
    fn serialized_asset_omits_credentials() {
        let mut asset = Asset::new("a1");
        asset.bmc_password = "hunter2".to_string();
        let json = serde_json::to_string(&asset).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
