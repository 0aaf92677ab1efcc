use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::{OrderFilled, CTF_EXCHANGE, NEG_RISK_EXCHANGE};
use crate::db::activity_repo;
use crate::models::{Side, TradeEvent};

/// Polls both exchanges for `OrderFilled` logs involving the tracked
/// wallets and feeds them, deduplicated and in chain order, into the
/// trade channel.
pub struct ChainMonitor {
    provider: DynProvider,
    pool: SqlitePool,
    targets: HashSet<Address>,
    tx: mpsc::Sender<TradeEvent>,
    poll_interval: Duration,
    block_window: u64,
    cursor: u64,
    consecutive_failures: u32,
}

impl ChainMonitor {
    pub fn new(
        provider: DynProvider,
        pool: SqlitePool,
        target_users: &[String],
        tx: mpsc::Sender<TradeEvent>,
        poll_interval: Duration,
        block_window: u64,
    ) -> anyhow::Result<Self> {
        let targets = target_users
            .iter()
            .map(|s| Address::from_str(s))
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(Self {
            provider,
            pool,
            targets,
            tx,
            poll_interval,
            block_window,
            cursor: 0,
            consecutive_failures: 0,
        })
    }

    pub async fn run(mut self) {
        tracing::info!(
            targets = self.targets.len(),
            window = self.block_window,
            "chain monitor started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(()) => self.consecutive_failures = 0,
                Err(e) => {
                    // Cursor stays put; the same window is retried next
                    // tick, with a capped backoff on repeated failure.
                    self.consecutive_failures += 1;
                    tracing::warn!(
                        error = %e,
                        cursor = self.cursor,
                        failures = self.consecutive_failures,
                        "poll window failed"
                    );
                    metrics::counter!("monitor_poll_errors_total").increment(1);
                    let backoff = Duration::from_secs(2 * self.consecutive_failures.min(5) as u64);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn poll_once(&mut self) -> anyhow::Result<()> {
        let head = self.provider.get_block_number().await?;

        // First tick after startup: begin at the head, history is the
        // portfolio sync's problem.
        if self.cursor == 0 {
            self.cursor = head;
            tracing::info!(head, "cursor initialized");
            return Ok(());
        }
        if head <= self.cursor {
            return Ok(());
        }

        let from = self.cursor + 1;
        let to = head.min(self.cursor + self.block_window);

        let filter = Filter::new()
            .address(vec![CTF_EXCHANGE, NEG_RISK_EXCHANGE])
            .event_signature(OrderFilled::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);

        let logs = self.provider.get_logs(&filter).await?;

        let mut events = decode_target_fills(&logs, &self.targets);
        events.sort_by_key(|e| (e.block_number, e.log_index));

        for event in events {
            let key = event.dedup_key();
            if !activity_repo::try_mark_processed(&self.pool, &key, &event.user).await? {
                tracing::debug!(%key, "fill already processed");
                continue;
            }

            metrics::counter!("fills_detected_total").increment(1);
            tracing::info!(
                user = %event.user,
                side = %event.side,
                block = event.block_number,
                tx = %event.tx_hash,
                "target fill detected"
            );

            // The cursor advances regardless of emission problems; a
            // window is never re-scanned once its logs were fetched.
            if self.tx.send(event).await.is_err() {
                tracing::error!("trade channel closed, dropping fill");
            }
        }

        self.cursor = to;
        metrics::gauge!("monitor_cursor_block").set(to as f64);
        Ok(())
    }
}

/// Decode raw logs and keep fills where a tracked wallet sat on either
/// side of the order.
fn decode_target_fills(logs: &[Log], targets: &HashSet<Address>) -> Vec<TradeEvent> {
    logs.iter()
        .filter_map(|log| {
            let decoded = log.log_decode::<OrderFilled>().ok()?;
            let fill = &decoded.inner.data;

            let (user, side) = classify_fill(
                fill.maker,
                fill.taker,
                fill.makerAssetId,
                fill.takerAssetId,
                targets,
            )?;

            Some(TradeEvent {
                user: format!("{user:#x}"),
                tx_hash: log
                    .transaction_hash
                    .map(|h| format!("{h:#x}"))
                    .unwrap_or_default(),
                maker: format!("{:#x}", fill.maker),
                taker: format!("{:#x}", fill.taker),
                maker_asset_id: fill.makerAssetId.to_string(),
                taker_asset_id: fill.takerAssetId.to_string(),
                side,
                block_number: log.block_number.unwrap_or_default(),
                log_index: log.log_index.unwrap_or_default(),
            })
        })
        .collect()
}

/// Which tracked wallet this fill belongs to, and the direction from its
/// perspective. Asset id zero is the collateral (USDC) leg: a wallet
/// giving collateral is buying outcome tokens, a wallet giving tokens is
/// selling. Maker wins if both sides are tracked.
fn classify_fill(
    maker: Address,
    taker: Address,
    maker_asset_id: U256,
    taker_asset_id: U256,
    targets: &HashSet<Address>,
) -> Option<(Address, Side)> {
    if targets.contains(&maker) {
        let side = if maker_asset_id.is_zero() {
            Side::Buy
        } else {
            Side::Sell
        };
        Some((maker, side))
    } else if targets.contains(&taker) {
        let side = if taker_asset_id.is_zero() {
            Side::Buy
        } else {
            Side::Sell
        };
        Some((taker, side))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn targets(addrs: &[Address]) -> HashSet<Address> {
        addrs.iter().copied().collect()
    }

    #[test]
    fn maker_giving_collateral_is_buying() {
        let t = targets(&[addr(1)]);
        let got = classify_fill(addr(1), addr(2), U256::ZERO, U256::from(42), &t);
        assert_eq!(got, Some((addr(1), Side::Buy)));
    }

    #[test]
    fn maker_giving_tokens_is_selling() {
        let t = targets(&[addr(1)]);
        let got = classify_fill(addr(1), addr(2), U256::from(42), U256::ZERO, &t);
        assert_eq!(got, Some((addr(1), Side::Sell)));
    }

    #[test]
    fn taker_side_classified_from_taker_leg() {
        let t = targets(&[addr(2)]);
        let got = classify_fill(addr(1), addr(2), U256::from(42), U256::ZERO, &t);
        assert_eq!(got, Some((addr(2), Side::Buy)));
    }

    #[test]
    fn untracked_fill_ignored() {
        let t = targets(&[addr(9)]);
        assert_eq!(
            classify_fill(addr(1), addr(2), U256::ZERO, U256::from(42), &t),
            None
        );
    }

    #[test]
    fn maker_preferred_when_both_tracked() {
        let t = targets(&[addr(1), addr(2)]);
        let got = classify_fill(addr(1), addr(2), U256::ZERO, U256::from(42), &t);
        assert_eq!(got, Some((addr(1), Side::Buy)));
    }

    #[test]
    fn events_sort_in_chain_order() {
        let mk = |block, index| TradeEvent {
            user: "0xaa".into(),
            tx_hash: format!("0x{block}{index}"),
            maker: String::new(),
            taker: String::new(),
            maker_asset_id: "0".into(),
            taker_asset_id: "1".into(),
            side: Side::Buy,
            block_number: block,
            log_index: index,
        };

        let mut events = vec![mk(10, 2), mk(9, 5), mk(10, 0)];
        events.sort_by_key(|e| (e.block_number, e.log_index));

        let order: Vec<_> = events.iter().map(|e| (e.block_number, e.log_index)).collect();
        assert_eq!(order, vec![(9, 5), (10, 0), (10, 2)]);
    }
}
