use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use thiserror::Error;

use super::auth::ClobAuth;
use super::types::OrderBook;

const CLOB_API_BASE: &str = "https://clob.polymarket.com";

#[derive(Debug, Error)]
pub enum ClobClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication error: {0}")]
    Auth(#[from] super::auth::AuthError),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Thin REST client for the CLOB API. Book reads are public; the
/// balance endpoint needs L2 HMAC headers.
#[derive(Debug, Clone)]
pub struct ClobClient {
    http: Client,
    auth: Option<ClobAuth>,
    base_url: String,
}

impl ClobClient {
    pub fn new(http: Client, auth: Option<ClobAuth>) -> Self {
        Self {
            http,
            auth,
            base_url: CLOB_API_BASE.into(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(http: Client, auth: Option<ClobAuth>, base_url: String) -> Self {
        Self {
            http,
            auth,
            base_url,
        }
    }

    /// Order book snapshot for one token.
    pub async fn get_book(&self, token_id: &str) -> Result<OrderBook, ClobClientError> {
        let url = format!("{}/book", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json().await?)
    }

    /// Available collateral (USDC) for the authenticated account,
    /// scaled from the API's 6-decimal integer representation.
    pub async fn get_collateral_balance(&self, address: &str) -> Result<Decimal, ClobClientError> {
        let path = "/balance-allowance?asset_type=COLLATERAL&signature_type=1";
        let resp = self
            .authenticated_get(path, address)?
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = resp.json().await?;
        let raw = body
            .get("balance")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClobClientError::Unexpected("missing balance field".into()))?;

        let micro: Decimal = raw
            .parse()
            .map_err(|_| ClobClientError::Unexpected(format!("bad balance: {raw}")))?;

        Ok(micro / Decimal::from(1_000_000))
    }

    /// Build a GET request with L2 HMAC signature headers.
    fn authenticated_get(
        &self,
        path: &str,
        address: &str,
    ) -> Result<RequestBuilder, ClobClientError> {
        let auth = self
            .auth
            .as_ref()
            .ok_or_else(|| ClobClientError::Unexpected("CLOB credentials not configured".into()))?;

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = auth.sign(&timestamp, "GET", path, "")?;

        let url = format!("{}{}", self.base_url, path);
        let req = self
            .http
            .get(&url)
            .header("POLY-ADDRESS", address)
            .header("POLY-API-KEY", &auth.api_key)
            .header("POLY-SIGNATURE", signature)
            .header("POLY-TIMESTAMP", &timestamp)
            .header("POLY-PASSPHRASE", &auth.passphrase);

        Ok(req)
    }
}
