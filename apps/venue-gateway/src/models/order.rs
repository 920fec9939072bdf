//! Order types and lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy to open or add.
    Buy,
    /// Sell to close or reduce.
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute at the current market price.
    Market,
    /// Execute at the limit price or better.
    Limit,
    /// Becomes a market order once the stop price trades.
    Stop,
    /// Becomes a limit order once the stop price trades.
    StopLimit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::Stop => write!(f, "STOP"),
            Self::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Order lifecycle status as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created locally, not yet acknowledged by the venue.
    Pending,
    /// Acknowledged by the venue, working.
    Submitted,
    /// Some quantity filled, remainder still working.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled before completion.
    Cancelled,
    /// Rejected by the venue.
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses never transition again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Active orders are working at the venue and can still fill or cancel.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Submitted | Self::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Caller-supplied order intent, before validation and submission.
///
/// The ticket carries only what the caller decides; venue id, status, and
/// fill bookkeeping live on [`Order`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    /// Instrument symbol, uppercase.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Market, limit, stop, or stop-limit.
    pub order_type: OrderType,
    /// Number of shares, must be positive.
    pub quantity: u32,
    /// Limit price for LIMIT / STOP_LIMIT orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// Stop trigger price for STOP / STOP_LIMIT orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
}

impl OrderTicket {
    /// Market order ticket.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: u32) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
        }
    }

    /// Limit order ticket.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: u32,
        limit_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(limit_price),
            stop_price: None,
        }
    }
}

/// An order as tracked by the gateway across its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Venue-assigned order id, empty until the venue acknowledges.
    pub order_id: String,
    /// Locally generated idempotency id.
    pub client_order_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Ordered quantity.
    pub quantity: u32,
    /// Limit price, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// Stop trigger price, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Quantity filled so far.
    pub filled_quantity: u32,
    /// Volume-weighted average fill price.
    pub avg_fill_price: Decimal,
    /// When the venue acknowledged the order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    /// When the order reached FILLED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build a PENDING order from a validated ticket.
    #[must_use]
    pub fn from_ticket(ticket: &OrderTicket) -> Self {
        Self {
            order_id: String::new(),
            client_order_id: Uuid::new_v4().to_string(),
            symbol: ticket.symbol.clone(),
            side: ticket.side,
            order_type: ticket.order_type,
            quantity: ticket.quantity,
            limit_price: ticket.limit_price,
            stop_price: ticket.stop_price,
            status: OrderStatus::Pending,
            filled_quantity: 0,
            avg_fill_price: Decimal::ZERO,
            submitted_at: None,
            filled_at: None,
        }
    }

    /// Remaining unfilled quantity.
    #[must_use]
    pub const fn remaining_quantity(&self) -> u32 {
        self.quantity.saturating_sub(self.filled_quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn terminal_statuses_are_not_active() {
        for status in [OrderStatus::Filled, OrderStatus::Cancelled, OrderStatus::Rejected] {
            assert!(status.is_terminal());
            assert!(!status.is_active());
        }
    }

    #[test]
    fn active_statuses_are_not_terminal() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Submitted,
            OrderStatus::PartiallyFilled,
        ] {
            assert!(status.is_active());
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn order_from_ticket_starts_pending() {
        let ticket = OrderTicket::limit("AAPL", OrderSide::Buy, 10, dec!(150));
        let order = Order::from_ticket(&ticket);

        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.order_id.is_empty());
        assert!(!order.client_order_id.is_empty());
        assert_eq!(order.remaining_quantity(), 10);
        assert_eq!(order.limit_price, Some(dec!(150)));
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"PARTIALLY_FILLED\"");

        let back: OrderStatus = serde_json::from_str("\"FILLED\"").unwrap();
        assert_eq!(back, OrderStatus::Filled);
    }
}
