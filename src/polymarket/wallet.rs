use std::str::FromStr;

use alloy::signers::local::PrivateKeySigner;
use polymarket_client_sdk::auth::Signer;
use polymarket_client_sdk::clob::client::{Client, Config};
use polymarket_client_sdk::POLYGON;

type AuthedClient =
    Client<polymarket_client_sdk::auth::state::Authenticated<polymarket_client_sdk::auth::Normal>>;

/// Authenticated CLOB SDK client plus the local signer backing it.
///
/// The private key string is consumed at construction and not retained.
pub struct TraderWallet {
    signer: PrivateKeySigner,
    client: AuthedClient,
}

impl TraderWallet {
    /// Build from a hex private key (`0x` prefix optional), deriving or
    /// creating CLOB API credentials as needed.
    pub async fn new(private_key: &str) -> anyhow::Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key)?.with_chain_id(Some(POLYGON));

        let unauthenticated = Client::new("https://clob.polymarket.com", Config::default())?;
        let client = unauthenticated
            .authentication_builder(&signer)
            .authenticate()
            .await?;

        Ok(Self { signer, client })
    }

    /// Checksummed signer address.
    pub fn address(&self) -> String {
        format!("{}", self.client.address())
    }

    pub fn client(&self) -> &AuthedClient {
        &self.client
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}
