//! SQLite persistence for executed trades.
//!
//! Every fill seen by the trader is stored with its market id and UTC date so
//! that daily volume caps survive restarts and can be shared by several bots
//! quoting the same market.

use crate::filter::{DailyVolume, DailyVolumeStore};
use crate::model::{OrderAction, Trade};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};

/// Date format of the `date_utc` column.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed store of fills.
pub struct TradeStore {
    conn: Mutex<Connection>,
}

impl TradeStore {
    /// Open (or create) the database at `db_path`. `:memory:` is accepted.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        info!("Trade store initialized at {:?}", db_path.as_ref());
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                market_id TEXT NOT NULL,
                txid TEXT NOT NULL,
                date_utc TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                action TEXT NOT NULL,
                price TEXT NOT NULL,
                base_volume TEXT NOT NULL,
                quote_volume TEXT NOT NULL,
                PRIMARY KEY (market_id, txid)
            );
            CREATE INDEX IF NOT EXISTS idx_trades_market_date ON trades(market_id, date_utc, action);
            "#,
        )?;
        Ok(())
    }

    /// Store a fill. Returns `false` when the same transaction was already
    /// recorded for this market.
    pub fn record_trade(&self, market_id: &str, trade: &Trade) -> Result<bool> {
        let timestamp = trade.order.timestamp.unwrap_or_else(Utc::now);
        let price = trade.order.price.value();
        let base = trade.order.volume.value();
        let quote = trade.cost.map(|c| c.value()).unwrap_or(base * price);

        let inserted = self.conn().execute(
            r#"
            INSERT OR IGNORE INTO trades
                (market_id, txid, date_utc, timestamp, action, price, base_volume, quote_volume)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                market_id,
                trade.id(),
                timestamp.format(DATE_FORMAT).to_string(),
                timestamp.to_rfc3339(),
                trade.order.action.as_str(),
                price.to_string(),
                base.to_string(),
                quote.to_string(),
            ],
        )?;
        debug!(market_id, txid = trade.id(), inserted, "Recorded trade");
        Ok(inserted > 0)
    }

    pub fn trade_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl DailyVolumeStore for TradeStore {
    fn daily_volume(
        &self,
        market_ids: &[String],
        action: OrderAction,
        date: NaiveDate,
    ) -> Result<DailyVolume> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT base_volume, quote_volume
            FROM trades
            WHERE market_id = ?1 AND date_utc = ?2 AND action = ?3
            "#,
        )?;

        let date = date.format(DATE_FORMAT).to_string();
        let mut total = DailyVolume::default();
        for market_id in market_ids {
            let rows = stmt.query_map(params![market_id, date, action.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (base, quote) = row?;
                total.base_vol += Decimal::from_str(&base)
                    .with_context(|| format!("corrupt base volume '{}'", base))?;
                total.quote_vol += Decimal::from_str(&quote)
                    .with_context(|| format!("corrupt quote volume '{}'", quote))?;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Number, Order, TradingPair};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn trade(id: &str, action: OrderAction, volume: Decimal, day: u32) -> Trade {
        Trade {
            order: Order {
                timestamp: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).single(),
                ..Order::limit(
                    TradingPair::new("XLM", "USD"),
                    action,
                    Number::new(dec!(0.1), 7),
                    Number::new(volume, 7),
                )
            },
            transaction_id: Some(id.to_string()),
            cost: None,
        }
    }

    #[test]
    fn test_daily_volume_sums_markets_and_filters() {
        let store = TradeStore::new(":memory:").unwrap();
        store.record_trade("m1", &trade("a", OrderAction::Sell, dec!(10), 5)).unwrap();
        store.record_trade("m2", &trade("b", OrderAction::Sell, dec!(5), 5)).unwrap();
        store.record_trade("m1", &trade("c", OrderAction::Buy, dec!(7), 5)).unwrap();
        store.record_trade("m1", &trade("d", OrderAction::Sell, dec!(3), 6)).unwrap();
        store.record_trade("m3", &trade("e", OrderAction::Sell, dec!(100), 5)).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let ids = vec!["m1".to_string(), "m2".to_string()];
        let v = store.daily_volume(&ids, OrderAction::Sell, date).unwrap();
        assert_eq!(v.base_vol, dec!(15));
        assert_eq!(v.quote_vol, dec!(1.5));
    }

    #[test]
    fn test_duplicate_trade_ignored() {
        let store = TradeStore::new(":memory:").unwrap();
        let t = trade("a", OrderAction::Sell, dec!(10), 5);
        assert!(store.record_trade("m1", &t).unwrap());
        assert!(!store.record_trade("m1", &t).unwrap());
        assert_eq!(store.trade_count().unwrap(), 1);
    }
}
