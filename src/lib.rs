pub mod api;
pub mod chain;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod polymarket;
pub mod resolver;
pub mod services;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::chain::redemption::RedemptionEngine;
use crate::config::AppConfig;
use crate::engine::TradeEngine;
use crate::polymarket::BalanceChecker;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: AppConfig,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub pause_flag: Arc<AtomicBool>,
    pub engine: Arc<TradeEngine>,
    pub redemption: Option<Arc<RedemptionEngine>>,
    pub balance_checker: Option<Arc<BalanceChecker>>,
    pub wallet_address: Option<String>,
    pub live_trading: bool,
}
