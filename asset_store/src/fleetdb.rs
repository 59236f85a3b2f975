//! Fleet inventory API store backend.
//!
//! Thin HTTP adapter over the fleet inventory service. The API carries
//! the same asset/component shapes as the model crate; credentials live
//! in a sub-record that is only requested when the caller asks for them.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use asset_model::{Asset, Component, StoreKind};

use crate::{Repository, StoreError};

#[derive(Debug, Deserialize)]
struct ServerRecord {
    id: String,
    #[serde(default)]
    vendor: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    serial: String,
    #[serde(default)]
    facility: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    components: Vec<Component>,
    #[serde(default)]
    bmc: Option<BmcCredential>,
}

#[derive(Debug, Deserialize)]
struct BmcCredential {
    address: IpAddr,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ServerList {
    servers: Vec<ServerRecord>,
    total: usize,
}

#[derive(Debug, Serialize)]
struct InventoryUpdate<'a> {
    vendor: &'a str,
    model: &'a str,
    serial: &'a str,
    components: &'a [Component],
    bios_config: &'a HashMap<String, String>,
    metadata: &'a HashMap<String, String>,
}

pub struct FleetdbStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl FleetdbStore {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent(asset_model::APP_NAME)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn to_asset(record: ServerRecord, fetch_credentials: bool) -> Asset {
        let mut asset = Asset::new(record.id);
        if !record.vendor.is_empty() {
            asset.vendor = record.vendor;
        }
        if !record.model.is_empty() {
            asset.model = record.model;
        }
        if !record.serial.is_empty() {
            asset.serial = record.serial;
        }
        asset.facility = record.facility;
        asset.metadata = record.metadata;
        asset.components = record.components;

        if let Some(bmc) = record.bmc {
            asset.bmc_address = Some(bmc.address);
            if fetch_credentials {
                asset.bmc_username = bmc.username;
                asset.bmc_password = bmc.password;
            }
        }

        asset
    }
}

#[async_trait]
impl Repository for FleetdbStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Fleetdb
    }

    async fn asset_by_id(&self, id: &str, fetch_credentials: bool) -> Result<Asset, StoreError> {
        let url = format!(
            "{}/api/v1/servers/{id}?include_credentials={fetch_credentials}",
            self.base_url
        );

        let response = self.request(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let record: ServerRecord = response.error_for_status()?.json().await?;
        Ok(Self::to_asset(record, fetch_credentials))
    }

    async fn assets_by_offset_limit(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Asset>, usize), StoreError> {
        let url = format!(
            "{}/api/v1/servers?offset={offset}&limit={limit}",
            self.base_url
        );

        let list: ServerList = self
            .request(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let assets = list
            .servers
            .into_iter()
            .map(|record| Self::to_asset(record, false))
            .collect();

        Ok((assets, list.total))
    }

    async fn asset_update(&self, asset: &Asset) -> Result<(), StoreError> {
        let url = format!("{}/api/v1/servers/{}/inventory", self.base_url, asset.id);
        let body = InventoryUpdate {
            vendor: &asset.vendor,
            model: &asset.model,
            serial: &asset.serial,
            components: &asset.components,
            bios_config: &asset.bios_config,
            metadata: &asset.metadata,
        };

        self.request(self.client.put(&url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        tracing::debug!(asset_id = %asset.id, components = asset.components.len(), "inventory update written");
        Ok(())
    }
}
