//! One asset's collection-and-reconcile cycle.

mod device_collector;
mod queryor;

pub use device_collector::{stdout_output, DeviceCollector, OutputFn};
pub use queryor::{BmcQueryor, HttpQueryor, MockQueryor, QueryorError};

use asset_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("asset {0} has no usable BMC credentials")]
    MissingCredentials(String),
}
