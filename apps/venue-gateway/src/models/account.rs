//! Account summary snapshot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account-level financial snapshot assembled from the venue's streamed
/// account-value rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Venue account id.
    pub account_id: String,
    /// Settled cash.
    pub cash_balance: Decimal,
    /// Total portfolio value (cash + positions).
    pub portfolio_value: Decimal,
    /// Funds available for new orders.
    pub buying_power: Decimal,
    /// Margin headroom.
    pub margin_available: Decimal,
    /// Realized P&L for the current session.
    pub realized_pnl: Decimal,
    /// Unrealized P&L across open positions.
    pub unrealized_pnl: Decimal,
    /// Reporting currency.
    pub currency: String,
}

impl Default for AccountSummary {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            cash_balance: Decimal::ZERO,
            portfolio_value: Decimal::ZERO,
            buying_power: Decimal::ZERO,
            margin_available: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            currency: "USD".to_string(),
        }
    }
}
