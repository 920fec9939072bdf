//! Trade persistence port.
//!
//! The gateway hands completed trade records to this port after order
//! submission and never blocks on it; storage backends plug in behind the
//! trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::OrderSide;

/// A completed trade for the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Share count.
    pub quantity: u32,
    /// Execution or reference price.
    pub price: Decimal,
    /// Strategy tag for attribution.
    pub strategy: String,
    /// Commissions and fees.
    pub costs: Decimal,
    /// When the trade was recorded.
    pub executed_at: DateTime<Utc>,
}

/// Errors from a trade store backend.
#[derive(Debug, Clone, Error)]
pub enum TradeStoreError {
    /// The backend refused or could not persist the record.
    #[error("trade store unavailable: {0}")]
    Unavailable(String),
}

/// Port for persisting trade records.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Persist one trade record.
    async fn record_trade(&self, record: TradeRecord) -> Result<(), TradeStoreError>;
}

/// In-memory trade store for wiring and tests.
#[derive(Debug, Default)]
pub struct InMemoryTradeStore {
    trades: Mutex<Vec<TradeRecord>>,
}

impl InMemoryTradeStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Owned copy of all recorded trades.
    #[must_use]
    pub fn trades(&self) -> Vec<TradeRecord> {
        self.trades.lock().clone()
    }
}

#[async_trait]
impl TradeStore for InMemoryTradeStore {
    async fn record_trade(&self, record: TradeRecord) -> Result<(), TradeStoreError> {
        tracing::debug!(
            symbol = %record.symbol,
            side = %record.side,
            quantity = record.quantity,
            "recording trade"
        );
        self.trades.lock().push(record);
        Ok(())
    }
}
