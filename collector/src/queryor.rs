//! The BMC collection collaborator boundary.
//!
//! The wire protocol lives outside this system; a queryor hands back an
//! already-normalized [`Device`] inventory document and, where the
//! platform exposes one, a BIOS configuration map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use asset_model::{Asset, Device};

#[derive(Debug, thiserror::Error)]
pub enum QueryorError {
    #[error("asset has no BMC address")]
    MissingAddress,

    #[error("bmc query: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode inventory document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("bmc unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait BmcQueryor: Send + Sync {
    /// Fetch the normalized inventory document. Called exactly once per
    /// collection cycle; retry policy belongs to the caller.
    async fn inventory(&self, asset: &Asset) -> Result<Device, QueryorError>;

    /// Fetch the BIOS configuration map, if the platform exposes one.
    async fn bios_config(&self, asset: &Asset) -> Result<HashMap<String, String>, QueryorError>;
}

/// Queryor backed by the out-of-band normalizer agent reachable on the
/// asset's BMC address.
pub struct HttpQueryor {
    client: reqwest::Client,
}

impl HttpQueryor {
    pub fn new() -> Result<Self, QueryorError> {
        let client = reqwest::Client::builder()
            .user_agent(asset_model::APP_NAME)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }

    fn url(&self, asset: &Asset, path: &str) -> Result<String, QueryorError> {
        let address = asset.bmc_address.ok_or(QueryorError::MissingAddress)?;
        Ok(format!("https://{address}/{path}"))
    }
}

#[async_trait]
impl BmcQueryor for HttpQueryor {
    async fn inventory(&self, asset: &Asset) -> Result<Device, QueryorError> {
        let url = self.url(asset, "api/inventory")?;
        let device = self
            .client
            .get(&url)
            .basic_auth(&asset.bmc_username, Some(&asset.bmc_password))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(device)
    }

    async fn bios_config(&self, asset: &Asset) -> Result<HashMap<String, String>, QueryorError> {
        let url = self.url(asset, "api/bios")?;
        let config = self
            .client
            .get(&url)
            .basic_auth(&asset.bmc_username, Some(&asset.bmc_password))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(config)
    }
}

/// Canned queryor for tests and the mock store kind. Counts calls and
/// can be switched into a failing mode.
#[derive(Default)]
pub struct MockQueryor {
    device: Mutex<Device>,
    bios: Mutex<HashMap<String, String>>,
    fail: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl MockQueryor {
    pub fn with_device(device: Device) -> Self {
        Self {
            device: Mutex::new(device),
            ..Default::default()
        }
    }

    pub fn set_device(&self, device: Device) {
        *self.device.lock().unwrap() = device;
    }

    pub fn set_bios_config(&self, config: HashMap<String, String>) {
        *self.bios.lock().unwrap() = config;
    }

    /// Make subsequent inventory calls fail with the given message.
    pub fn fail_with(&self, msg: &str) {
        *self.fail.lock().unwrap() = Some(msg.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BmcQueryor for MockQueryor {
    async fn inventory(&self, _asset: &Asset) -> Result<Device, QueryorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.fail.lock().unwrap().clone() {
            return Err(QueryorError::Unreachable(msg));
        }
        Ok(self.device.lock().unwrap().clone())
    }

    async fn bios_config(&self, _asset: &Asset) -> Result<HashMap<String, String>, QueryorError> {
        Ok(self.bios.lock().unwrap().clone())
    }
}
