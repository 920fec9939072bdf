//! Venue state cache.
//!
//! Holds the gateway's last-known view of positions, orders, the account
//! summary, and last trade prices. The protocol session task is the only
//! writer; readers get owned copies and never observe a half-written
//! snapshot.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::models::{AccountSummary, Order, OrderStatus, Position};

/// Last-known venue state, shared between the session task and callers.
#[derive(Debug, Default)]
pub struct VenueStateCache {
    positions: RwLock<Vec<Position>>,
    orders: RwLock<HashMap<String, Order>>,
    account: RwLock<AccountSummary>,
    prices: RwLock<HashMap<String, Decimal>>,
}

impl VenueStateCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full position snapshot.
    pub fn replace_positions(&self, positions: Vec<Position>) {
        *self.positions.write() = positions;
    }

    /// Owned copy of all positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        self.positions.read().clone()
    }

    /// Position for a symbol, if held.
    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.positions
            .read()
            .iter()
            .find(|p| p.symbol == symbol)
            .cloned()
    }

    /// Insert or overwrite an order keyed by venue order id.
    pub fn upsert_order(&self, order: Order) {
        if order.order_id.is_empty() {
            tracing::warn!(
                client_order_id = %order.client_order_id,
                "refusing to cache order without venue id"
            );
            return;
        }
        self.orders.write().insert(order.order_id.clone(), order);
    }

    /// Apply a venue order-status callback to a cached order.
    ///
    /// Returns `false` when the order id is unknown (e.g. placed by another
    /// session of the same account).
    pub fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        filled_quantity: u32,
        avg_fill_price: Decimal,
    ) -> bool {
        let mut orders = self.orders.write();
        let Some(order) = orders.get_mut(order_id) else {
            return false;
        };

        // terminal statuses never transition again
        if order.status.is_terminal() {
            tracing::debug!(
                order_id = %order_id,
                current = %order.status,
                incoming = %status,
                "ignoring status update for terminal order"
            );
            return true;
        }

        order.status = status;
        order.filled_quantity = filled_quantity;
        order.avg_fill_price = avg_fill_price;
        if status == OrderStatus::Filled {
            order.filled_at = Some(Utc::now());
        }
        true
    }

    /// Owned copy of an order by venue id.
    #[must_use]
    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.orders.read().get(order_id).cloned()
    }

    /// Orders still working at the venue.
    #[must_use]
    pub fn open_orders(&self) -> Vec<Order> {
        self.orders
            .read()
            .values()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect()
    }

    /// Replace the account summary.
    pub fn replace_account(&self, account: AccountSummary) {
        *self.account.write() = account;
    }

    /// Owned copy of the account summary.
    #[must_use]
    pub fn account(&self) -> AccountSummary {
        self.account.read().clone()
    }

    /// Record a last trade price.
    pub fn record_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().insert(symbol.to_string(), price);
    }

    /// Last recorded price for a symbol, falling back to the position row's
    /// price. Feeds the validation pipeline's notional estimate.
    #[must_use]
    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        if let Some(price) = self.prices.read().get(symbol) {
            return Some(*price);
        }
        self.position(symbol).and_then(|p| p.last_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, OrderTicket};
    use rust_decimal_macros::dec;

    fn cached_order(order_id: &str) -> Order {
        let ticket = OrderTicket::limit("AAPL", OrderSide::Buy, 10, dec!(150));
        let mut order = Order::from_ticket(&ticket);
        order.order_id = order_id.to_string();
        order.status = OrderStatus::Submitted;
        order
    }

    #[test]
    fn positions_snapshot_is_replaced_wholesale() {
        let cache = VenueStateCache::new();
        cache.replace_positions(vec![Position {
            symbol: "AAPL".to_string(),
            quantity: 20,
            avg_cost: dec!(140),
            last_price: Some(dec!(150)),
            currency: "USD".to_string(),
        }]);

        assert_eq!(cache.positions().len(), 1);
        assert_eq!(cache.position("AAPL").unwrap().quantity, 20);
        assert!(cache.position("MSFT").is_none());

        cache.replace_positions(vec![]);
        assert!(cache.positions().is_empty());
    }

    #[test]
    fn order_status_updates_apply_until_terminal() {
        let cache = VenueStateCache::new();
        cache.upsert_order(cached_order("V-1"));

        assert!(cache.update_order_status("V-1", OrderStatus::Filled, 10, dec!(150)));
        let order = cache.order("V-1").unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, 10);
        assert!(order.filled_at.is_some());

        // terminal: a late update is absorbed without changing state
        assert!(cache.update_order_status("V-1", OrderStatus::Cancelled, 10, dec!(150)));
        assert_eq!(cache.order("V-1").unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn unknown_order_update_returns_false() {
        let cache = VenueStateCache::new();
        assert!(!cache.update_order_status("ghost", OrderStatus::Filled, 1, dec!(1)));
    }

    #[test]
    fn open_orders_excludes_terminal() {
        let cache = VenueStateCache::new();
        cache.upsert_order(cached_order("V-1"));
        let mut filled = cached_order("V-2");
        filled.status = OrderStatus::Filled;
        cache.upsert_order(filled);

        let open = cache.open_orders();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].order_id, "V-1");
    }

    #[test]
    fn last_price_prefers_tick_over_position_row() {
        let cache = VenueStateCache::new();
        cache.replace_positions(vec![Position {
            symbol: "AAPL".to_string(),
            quantity: 20,
            avg_cost: dec!(140),
            last_price: Some(dec!(149)),
            currency: "USD".to_string(),
        }]);

        assert_eq!(cache.last_price("AAPL"), Some(dec!(149)));

        cache.record_price("AAPL", dec!(151));
        assert_eq!(cache.last_price("AAPL"), Some(dec!(151)));
        assert_eq!(cache.last_price("MSFT"), None);
    }

    #[test]
    fn order_without_venue_id_is_not_cached() {
        let cache = VenueStateCache::new();
        let ticket = OrderTicket::market("AAPL", OrderSide::Buy, 1);
        cache.upsert_order(Order::from_ticket(&ticket));
        assert!(cache.open_orders().is_empty());
    }
}
