//! JSON codec for venue wire messages.

use rust_decimal::Decimal;

use crate::error::GatewayError;
use crate::models::AccountSummary;
use crate::venue::messages::{VenueCallback, VenueRequest};

/// Encode a request for the wire.
pub fn encode_request(request: &VenueRequest) -> Result<String, GatewayError> {
    serde_json::to_string(request).map_err(|err| GatewayError::Codec {
        message: format!("failed to encode {}: {err}", request.label()),
    })
}

/// Decode a callback from the wire.
pub fn decode_callback(text: &str) -> Result<VenueCallback, GatewayError> {
    serde_json::from_str(text).map_err(|err| GatewayError::Codec {
        message: format!("failed to decode callback: {err}"),
    })
}

/// Fold one streamed account-value row into the summary under assembly.
///
/// Unknown keys are ignored; the venue streams more fields than we track.
/// Only the P&L fields may be negative; a negative balance row is a venue
/// data fault and is skipped so it never reaches the funds check.
pub fn apply_account_value(summary: &mut AccountSummary, key: &str, value: &str, currency: &str) {
    let Ok(amount) = value.parse::<Decimal>() else {
        tracing::debug!(key = %key, value = %value, "skipping non-numeric account value");
        return;
    };

    if amount < Decimal::ZERO && !matches!(key, "realized_pnl" | "unrealized_pnl") {
        tracing::warn!(key = %key, value = %value, "skipping negative account value");
        return;
    }

    match key {
        "cash_balance" => summary.cash_balance = amount,
        "portfolio_value" => summary.portfolio_value = amount,
        "buying_power" => summary.buying_power = amount,
        "margin_available" => summary.margin_available = amount,
        "realized_pnl" => summary.realized_pnl = amount,
        "unrealized_pnl" => summary.unrealized_pnl = amount,
        _ => return,
    }

    if !currency.is_empty() {
        summary.currency = currency.to_string();
    }
}
