use rust_decimal::Decimal;
use std::collections::HashMap;
use std::env;

const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";
const DEFAULT_DATABASE_URL: &str = "sqlite://polycopy.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Chain access
    pub rpc_url: String,
    pub private_key: Option<String>,
    /// Intermediary (smart-contract) wallet holding funds, if any.
    pub proxy_address: Option<String>,

    // Accounts to mirror (lowercase hex addresses)
    pub target_users: Vec<String>,
    /// Optional display names, keyed by lowercase address.
    pub target_names: HashMap<String, String>,

    // Polymarket CLOB API credentials (optional — required for order reads)
    pub clob_api_key: Option<String>,
    pub clob_api_secret: Option<String>,
    pub clob_passphrase: Option<String>,

    // Notification sink
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    // Monitor
    pub poll_interval_ms: u64,
    pub block_window: u64,
    pub indexing_delay_ms: u64,

    // Portfolio reconciliation
    pub portfolio_sync_interval_secs: u64,

    // Trade engine
    pub target_usd: Decimal,
    pub max_market_exposure_usd: Decimal,
    pub trade_cooldown_secs: u64,
    pub min_order_shares: u64,

    // Redemption
    pub claim_interval_secs: u64,
    pub nonce_backlog_threshold: u64,
    pub redemption_delay_secs: u64,

    // Gas
    pub priority_fee_floor_gwei: u64,
    pub max_fee_cap_gwei: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let target_users: Vec<String> = env::var("TARGET_USERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        // TARGET_NAMES format: "0xaddr=name,0xaddr2=name2"
        let target_names: HashMap<String, String> = env::var("TARGET_NAMES")
            .unwrap_or_default()
            .split(',')
            .filter_map(|pair| {
                let (addr, name) = pair.split_once('=')?;
                let addr = addr.trim().to_lowercase();
                let name = name.trim().to_string();
                (!addr.is_empty() && !name.is_empty()).then_some((addr, name))
            })
            .collect();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,

            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.into()),
            private_key: env::var("PRIVATE_KEY").ok().filter(|s| !s.is_empty()),
            proxy_address: env::var("PROXY_ADDRESS").ok().filter(|s| !s.is_empty()),

            target_users,
            target_names,

            clob_api_key: env::var("CLOB_API_KEY").ok(),
            clob_api_secret: env::var("CLOB_API_SECRET").ok(),
            clob_passphrase: env::var("CLOB_PASSPHRASE").ok(),

            telegram_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),

            poll_interval_ms: parse_env("POLL_INTERVAL_MS", 6_000),
            block_window: parse_env("BLOCK_WINDOW", 100),
            indexing_delay_ms: parse_env("INDEXING_DELAY_MS", 2_000),

            portfolio_sync_interval_secs: parse_env("PORTFOLIO_SYNC_INTERVAL_SECS", 300),

            target_usd: parse_env_decimal("MAX_POSITION_SIZE_USD", Decimal::ONE),
            max_market_exposure_usd: parse_env_decimal(
                "MAX_MARKET_EXPOSURE_USD",
                Decimal::from(10),
            ),
            trade_cooldown_secs: parse_env("TRADE_COOLDOWN_SECS", 60),
            min_order_shares: parse_env("MIN_ORDER_SHARES", 5),

            claim_interval_secs: parse_env("CLAIM_INTERVAL_SECS", 3_600),
            nonce_backlog_threshold: parse_env("NONCE_BACKLOG_THRESHOLD", 5),
            redemption_delay_secs: parse_env("REDEMPTION_DELAY_SECS", 2),

            priority_fee_floor_gwei: parse_env("PRIORITY_FEE_FLOOR_GWEI", 35),
            max_fee_cap_gwei: parse_env("MAX_FEE_CAP_GWEI", 600),
        })
    }

    /// Returns true if all CLOB API credentials are configured.
    pub fn has_clob_auth(&self) -> bool {
        self.clob_api_key.is_some()
            && self.clob_api_secret.is_some()
            && self.clob_passphrase.is_some()
    }

    /// Returns true if the notification sink is configured.
    pub fn has_telegram(&self) -> bool {
        self.telegram_token.is_some() && self.telegram_chat_id.is_some()
    }

    pub fn target_name(&self, address: &str) -> Option<&str> {
        self.target_names
            .get(&address.to_lowercase())
            .map(String::as_str)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_decimal(key: &str, default: Decimal) -> Decimal {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
