//! Polls the primary venue for fills and fans them out.

use crate::exchange::TradeFetcher;
use crate::model::TradingPair;
use crate::persistence::TradeStore;
use crate::strategy::FillHandler;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct FillTracker {
    pair: TradingPair,
    fetcher: Arc<dyn TradeFetcher>,
    store: Arc<TradeStore>,
    market_id: String,
    handlers: Vec<Arc<dyn FillHandler>>,
    poll_interval: Duration,
    cursor: Option<String>,
}

impl FillTracker {
    pub fn new(
        pair: TradingPair,
        fetcher: Arc<dyn TradeFetcher>,
        store: Arc<TradeStore>,
        market_id: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pair,
            fetcher,
            store,
            market_id,
            handlers: Vec::new(),
            poll_interval,
            cursor: None,
        }
    }

    pub fn register_handlers(&mut self, handlers: impl IntoIterator<Item = Arc<dyn FillHandler>>) {
        self.handlers.extend(handlers);
    }

    /// Skip past all fills that happened before start-up.
    pub async fn seek_to_latest(&mut self) -> Result<()> {
        let page = self
            .fetcher
            .get_trades(&self.pair, self.cursor.clone())
            .await
            .context("Failed to fetch trade history")?;
        if page.cursor.is_some() {
            self.cursor = page.cursor;
        }
        debug!(cursor = ?self.cursor, skipped = page.trades.len(), "Fill tracker positioned");
        Ok(())
    }

    /// Fetch new fills, record them and notify the handlers.
    ///
    /// A fill already recorded for this market is not dispatched again.
    /// Handler failures are logged and do not stop the remaining handlers.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let page = self
            .fetcher
            .get_trades(&self.pair, self.cursor.clone())
            .await
            .context("Failed to fetch trades")?;

        let mut dispatched = 0;
        for trade in &page.trades {
            if !self.store.record_trade(&self.market_id, trade)? {
                debug!(txid = trade.id(), "Fill already recorded");
                continue;
            }
            info!(
                txid = trade.id(),
                action = %trade.order.action,
                price = %trade.order.price,
                volume = %trade.order.volume,
                "💰 [FILL] New fill"
            );
            for handler in &self.handlers {
                if let Err(e) = handler.handle_fill(trade).await {
                    error!(txid = trade.id(), error = %e, "Fill handler failed");
                }
            }
            dispatched += 1;
        }

        if page.cursor.is_some() {
            self.cursor = page.cursor;
        }
        Ok(dispatched)
    }

    pub async fn run(mut self, shutdown: Arc<AtomicBool>) {
        info!(
            pair = %self.pair,
            handlers = self.handlers.len(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Starting fill tracker"
        );
        if let Err(e) = self.seek_to_latest().await {
            warn!(error = %e, "Could not skip historical fills");
        }
        while !shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Fill check failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
