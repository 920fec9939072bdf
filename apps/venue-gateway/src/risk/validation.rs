//! Order validation pipeline.
//!
//! Ordered, short-circuiting checks evaluated against a read-only snapshot
//! of account and position state. Outcomes are values, not errors: a
//! rejected order returns `(valid: false, reason)` and the caller branches.
//! Checks are pure, so validating the same order against the same snapshot
//! twice yields the same outcome.

use rust_decimal::Decimal;

use crate::config::RiskConfig;
use crate::models::{AccountSummary, OrderSide, OrderTicket, OrderType, Position};

/// Result of running the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Whether the order may proceed to the wire.
    pub valid: bool,
    /// First failing check's reason, `None` when valid.
    pub reason: Option<String>,
}

impl ValidationOutcome {
    fn ok() -> Self {
        Self { valid: true, reason: None }
    }

    fn fail(reason: String) -> Self {
        Self { valid: false, reason: Some(reason) }
    }
}

/// Read-only state the pipeline evaluates against.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Current account snapshot.
    pub account: &'a AccountSummary,
    /// Current position rows.
    pub positions: &'a [Position],
    /// Last known price for the order's symbol, if any.
    pub last_price: Option<Decimal>,
}

/// The ordered pre-trade pipeline.
#[derive(Debug, Clone)]
pub struct OrderValidator {
    config: RiskConfig,
}

impl OrderValidator {
    /// Validator with the given risk limits.
    #[must_use]
    pub const fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Run the checks in order, stopping at the first failure.
    #[must_use]
    pub fn validate(&self, ticket: &OrderTicket, ctx: &ValidationContext<'_>) -> ValidationOutcome {
        let failure = check_symbol(ticket)
            .or_else(|| self.check_quantity(ticket))
            .or_else(|| check_limit_price(ticket))
            .or_else(|| check_stop_price(ticket))
            .or_else(|| self.check_buy_funds(ticket, ctx))
            .or_else(|| check_sell_position(ticket, ctx))
            .or_else(|| self.check_position_concentration(ticket, ctx))
            .or_else(|| self.check_daily_loss(ctx));

        match failure {
            Some(reason) => ValidationOutcome::fail(reason),
            None => ValidationOutcome::ok(),
        }
    }

    fn check_quantity(&self, ticket: &OrderTicket) -> Option<String> {
        if ticket.quantity == 0 {
            return Some("Quantity must be positive".to_string());
        }
        if ticket.quantity > self.config.max_order_size {
            return Some(format!(
                "Quantity {} exceeds maximum order size {}",
                ticket.quantity, self.config.max_order_size
            ));
        }
        None
    }

    /// BUY notional against buying power and the per-order value cap.
    ///
    /// Reference price: the limit price when present, else the last known
    /// market price. Without either, the check fails rather than passing a
    /// BUY whose cost cannot be estimated.
    fn check_buy_funds(&self, ticket: &OrderTicket, ctx: &ValidationContext<'_>) -> Option<String> {
        if ticket.side != OrderSide::Buy {
            return None;
        }

        let Some(reference_price) = ticket.limit_price.or(ctx.last_price) else {
            return Some(format!(
                "No reference price available for {} to estimate order cost",
                ticket.symbol
            ));
        };

        let notional = Decimal::from(ticket.quantity) * reference_price;
        if notional > self.config.max_order_value {
            return Some(format!(
                "Order value {notional} exceeds maximum order value {}",
                self.config.max_order_value
            ));
        }
        if notional > ctx.account.buying_power {
            return Some(format!(
                "Insufficient buying power: order value {notional} exceeds buying power {}",
                ctx.account.buying_power
            ));
        }
        None
    }

    /// Post-fill position concentration against the portfolio value.
    fn check_position_concentration(
        &self,
        ticket: &OrderTicket,
        ctx: &ValidationContext<'_>,
    ) -> Option<String> {
        if ticket.side != OrderSide::Buy || ctx.account.portfolio_value <= Decimal::ZERO {
            return None;
        }
        let Some(reference_price) = ticket.limit_price.or(ctx.last_price) else {
            return None;
        };

        let existing = ctx
            .positions
            .iter()
            .find(|p| p.symbol == ticket.symbol)
            .and_then(Position::market_value)
            .unwrap_or(Decimal::ZERO);
        let projected = existing + Decimal::from(ticket.quantity) * reference_price;
        let limit = ctx.account.portfolio_value * self.config.max_position_pct;

        if projected > limit {
            return Some(format!(
                "Position in {} would reach {projected}, above the {limit} concentration limit",
                ticket.symbol
            ));
        }
        None
    }

    /// Halt new orders once the session's realized loss hits the limit.
    fn check_daily_loss(&self, ctx: &ValidationContext<'_>) -> Option<String> {
        if ctx.account.realized_pnl <= -self.config.daily_loss_limit {
            return Some(format!(
                "Daily loss limit reached: realized P&L {} at limit {}",
                ctx.account.realized_pnl, self.config.daily_loss_limit
            ));
        }
        None
    }
}

fn check_symbol(ticket: &OrderTicket) -> Option<String> {
    if ticket.symbol.trim().is_empty() {
        return Some("Symbol must not be empty".to_string());
    }
    None
}

fn check_limit_price(ticket: &OrderTicket) -> Option<String> {
    if !matches!(ticket.order_type, OrderType::Limit | OrderType::StopLimit) {
        return None;
    }
    match ticket.limit_price {
        None => Some(format!("{} order requires a limit price", ticket.order_type)),
        Some(price) if price <= Decimal::ZERO => {
            Some(format!("Limit price {price} must be positive"))
        }
        Some(_) => None,
    }
}

fn check_stop_price(ticket: &OrderTicket) -> Option<String> {
    if !matches!(ticket.order_type, OrderType::Stop | OrderType::StopLimit) {
        return None;
    }
    match ticket.stop_price {
        None => Some(format!("{} order requires a stop price", ticket.order_type)),
        Some(price) if price <= Decimal::ZERO => {
            Some(format!("Stop price {price} must be positive"))
        }
        Some(_) => None,
    }
}

/// SELL quantity against the absolute held position.
fn check_sell_position(ticket: &OrderTicket, ctx: &ValidationContext<'_>) -> Option<String> {
    if ticket.side != OrderSide::Sell {
        return None;
    }
    let held = ctx
        .positions
        .iter()
        .find(|p| p.symbol == ticket.symbol)
        .map_or(0, |p| p.quantity.unsigned_abs());

    if u64::from(ticket.quantity) > held {
        return Some(format!(
            "Insufficient shares: selling {} but holding {held} of {}",
            ticket.quantity, ticket.symbol
        ));
    }
    None
}
