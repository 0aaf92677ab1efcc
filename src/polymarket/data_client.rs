use reqwest::Client;
use thiserror::Error;

use super::types::{ApiPosition, ApiTrade};

const DATA_API_BASE: &str = "https://data-api.polymarket.com";

#[derive(Debug, Error)]
pub enum DataClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Read-only client for the public Polymarket data API.
#[derive(Debug, Clone)]
pub struct DataClient {
    http: Client,
    base_url: String,
}

impl DataClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: DATA_API_BASE.into(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(http: Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Current holdings of a wallet.
    pub async fn get_positions(&self, user: &str) -> Result<Vec<ApiPosition>, DataClientError> {
        let url = format!("{}/positions", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("user", user)])
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json().await?)
    }

    /// Recent fills of a wallet, newest first.
    pub async fn get_trades(&self, user: &str) -> Result<Vec<ApiTrade>, DataClientError> {
        let url = format!("{}/trades", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("user", user)])
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json().await?)
    }
}
