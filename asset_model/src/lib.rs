//! Canonical data model for the assayer inventory pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod asset;
mod component;

pub use asset::Asset;
pub use component::{Component, ComponentIdentity, Device};

pub const APP_NAME: &str = "assayer";

/// Placeholder for an attribute value that has not been determined yet.
/// Treated as absent by the scalar attribute merge.
pub const UNKNOWN: &str = "unknown";

/// Keys under which pipeline stages record per-asset errors.
pub mod stage {
    pub const CREDENTIALS: &str = "credentials";
    pub const COLLECT: &str = "collect";
    pub const BIOSCFG: &str = "bioscfg";
    pub const RECONCILE: &str = "reconcile";
    pub const STORE: &str = "store";
    pub const CANCELLED: &str = "cancelled";
}

/// Inventory store backend kinds. The set is closed; selection happens
/// once at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Fleetdb,
    Csv,
    Mock,
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported store kind: {0}")]
pub struct UnsupportedStoreKind(pub String);

impl FromStr for StoreKind {
    type Err = UnsupportedStoreKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fleetdb" => Ok(StoreKind::Fleetdb),
            "csv" => Ok(StoreKind::Csv),
            "mock" => Ok(StoreKind::Mock),
            other => Err(UnsupportedStoreKind(other.to_string())),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreKind::Fleetdb => "fleetdb",
            StoreKind::Csv => "csv",
            StoreKind::Mock => "mock",
        };
        f.write_str(s)
    }
}

/// Kinds of work a condition message can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    #[serde(rename = "inventoryOutofband")]
    InventoryOutofband,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionKind::InventoryOutofband => f.write_str("inventoryOutofband"),
        }
    }
}
