use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use polymarket_client_sdk::auth::Signer;
use polymarket_client_sdk::POLYGON;

use polycopy::api::create_router;
use polycopy::chain::gas::GasOracle;
use polycopy::chain::monitor::ChainMonitor;
use polycopy::chain::redemption::RedemptionEngine;
use polycopy::config::AppConfig;
use polycopy::db;
use polycopy::engine::{LimitGuard, TradeEngine};
use polycopy::metrics::init_metrics;
use polycopy::models::TradeEvent;
use polycopy::polymarket::{
    BalanceChecker, ClobAuth, ClobClient, DataClient, TraderWallet, TradingClient,
};
use polycopy::resolver::AssetResolver;
use polycopy::services::{Notifier, PortfolioSync};
use polycopy::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    if config.target_users.is_empty() {
        anyhow::bail!("TARGET_USERS is empty, nothing to mirror");
    }
    let addr = format!("{}:{}", config.host, config.port);

    let metrics_handle = init_metrics();

    tracing::info!("connecting to database...");
    let pool = db::init_pool(&config.database_url).await?;
    tracing::info!("database ready");

    let http = reqwest::Client::new();
    let auth = config.has_clob_auth().then(|| {
        ClobAuth::new(
            config.clob_api_key.clone().unwrap(),
            config.clob_api_secret.clone().unwrap(),
            config.clob_passphrase.clone().unwrap(),
        )
    });
    let clob = ClobClient::new(http.clone(), auth.clone());
    let data = DataClient::new(http.clone());

    let rpc_url: reqwest::Url = config.rpc_url.parse()?;
    let read_provider = ProviderBuilder::new().connect_http(rpc_url.clone()).erased();

    // --- Signer-dependent pieces; absent means dry run ---
    let mut trading = None;
    let mut redemption = None;
    let mut wallet_address = None;

    if let Some(key) = &config.private_key {
        let wallet = Arc::new(TraderWallet::new(key).await?);
        wallet_address = Some(wallet.address());
        trading = Some(Arc::new(TradingClient::new(wallet)));
    } else {
        tracing::warn!("PRIVATE_KEY not set, running in dry-run mode");
    }

    let funds_address = config
        .proxy_address
        .clone()
        .or_else(|| wallet_address.clone())
        .map(|a| a.to_lowercase());

    let balance_checker = match (&auth, &funds_address) {
        (Some(_), Some(address)) => Some(Arc::new(BalanceChecker::new(
            clob.clone(),
            data.clone(),
            read_provider.clone(),
            address.clone(),
        ))),
        _ => None,
    };

    let notifier = Arc::new(Notifier::new(
        config.telegram_token.clone(),
        config.telegram_chat_id.clone(),
    ));

    let resolver = Arc::new(AssetResolver::new(
        pool.clone(),
        data.clone(),
        Duration::from_millis(config.indexing_delay_ms),
    ));

    // Reconcile the ledger before acting on anything new, then keep
    // reconciling on a timer to pick up drift (manual trades, restarts).
    if let Some(account) = &funds_address {
        let sync = PortfolioSync::new(
            pool.clone(),
            data.clone(),
            resolver.clone(),
            account.clone(),
        );
        if let Err(e) = sync.sync_once().await {
            tracing::warn!(error = %e, "portfolio sync failed, continuing with local ledger");
        }
        tokio::spawn(sync.run(Duration::from_secs(config.portfolio_sync_interval_secs)));
    }

    // --- Monitor -> engine pipeline ---
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<TradeEvent>(500);

    let monitor = ChainMonitor::new(
        read_provider.clone(),
        pool.clone(),
        &config.target_users,
        event_tx,
        Duration::from_millis(config.poll_interval_ms),
        config.block_window,
    )?;
    tokio::spawn(monitor.run());

    let pause_flag = Arc::new(AtomicBool::new(false));
    let limits = LimitGuard::new(
        config.max_market_exposure_usd,
        Duration::from_secs(config.trade_cooldown_secs),
    );
    let engine = Arc::new(TradeEngine::new(
        pool.clone(),
        resolver.clone(),
        clob.clone(),
        data.clone(),
        trading.clone(),
        balance_checker.clone(),
        notifier.clone(),
        limits,
        config.target_usd,
        config.min_order_shares,
        config.target_names.clone(),
        funds_address.clone(),
        pause_flag.clone(),
    ));
    tokio::spawn(engine.clone().run(event_rx));

    // --- Redemption loop, only with a signer to pay gas ---
    if let Some(key) = &config.private_key {
        let signer = PrivateKeySigner::from_str(key)?.with_chain_id(Some(POLYGON));
        let signer_address = signer.address();
        let write_provider = ProviderBuilder::new()
            .wallet(signer)
            .connect_http(rpc_url)
            .erased();

        let proxy_address = config
            .proxy_address
            .as_deref()
            .map(Address::from_str)
            .transpose()?;

        let oracle = GasOracle::new(config.priority_fee_floor_gwei, config.max_fee_cap_gwei);
        let engine_arc = Arc::new(RedemptionEngine::new(
            write_provider,
            pool.clone(),
            data.clone(),
            oracle,
            notifier.clone(),
            signer_address,
            proxy_address,
            config.nonce_backlog_threshold,
            Duration::from_secs(config.redemption_delay_secs),
            Duration::from_secs(config.claim_interval_secs),
        ));
        tokio::spawn(engine_arc.clone().run());
        redemption = Some(engine_arc);
    }

    let live_trading = trading.is_some();
    let state = AppState {
        db: pool,
        config,
        metrics_handle,
        pause_flag,
        engine,
        redemption,
        balance_checker,
        wallet_address,
        live_trading,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}
