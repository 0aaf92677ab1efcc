use std::sync::Arc;

use polymarket_client_sdk::clob::types::response::PostOrderResponse;
use polymarket_client_sdk::clob::types::Side as SdkSide;
use polymarket_client_sdk::types::U256;
use rust_decimal::Decimal;

use super::wallet::TraderWallet;
use crate::models::Side;

/// Price used to flush shares when mirroring a sell. Executes against
/// whatever bids exist, effectively a market order.
pub const DEEP_DISCOUNT_PRICE: &str = "0.001";

/// Order placement wrapper around the SDK client.
pub struct TradingClient {
    wallet: Arc<TraderWallet>,
}

impl TradingClient {
    pub fn new(wallet: Arc<TraderWallet>) -> Self {
        Self { wallet }
    }

    pub fn wallet(&self) -> &Arc<TraderWallet> {
        &self.wallet
    }

    /// Place a limit order for `size` shares of a CTF token at `price`.
    pub async fn place_limit_order(
        &self,
        token_id: &str,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> anyhow::Result<PostOrderResponse> {
        let sdk_side = match side {
            Side::Buy => SdkSide::Buy,
            Side::Sell => SdkSide::Sell,
        };

        let token_id_u256 = parse_token_id(token_id)?;

        let client = self.wallet.client();
        let signable_order = client
            .limit_order()
            .token_id(token_id_u256)
            .side(sdk_side)
            .price(price)
            .size(size)
            .build()
            .await?;

        let signed_order = client.sign(self.wallet.signer(), signable_order).await?;
        let response = client.post_order(signed_order).await?;

        tracing::info!(
            order_id = ?response.order_id,
            status = ?response.status,
            %side,
            %size,
            %price,
            "order submitted to CLOB"
        );

        Ok(response)
    }

    /// Sell `size` shares at a deep discount so the order fills against
    /// the live bids immediately.
    pub async fn sell_at_market(
        &self,
        token_id: &str,
        size: Decimal,
    ) -> anyhow::Result<PostOrderResponse> {
        let price: Decimal = DEEP_DISCOUNT_PRICE.parse().expect("const price");
        self.place_limit_order(token_id, Side::Sell, size, price)
            .await
    }
}

/// Token ids arrive as decimal strings from the data API but may be hex
/// when sourced from raw logs.
fn parse_token_id(token_id: &str) -> anyhow::Result<U256> {
    if let Some(hex) = token_id.strip_prefix("0x") {
        return Ok(U256::from_str_radix(hex, 16)?);
    }
    Ok(U256::from_str_radix(token_id, 10)?)
}
