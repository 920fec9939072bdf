//! Venue wire messages.
//!
//! The venue speaks tagged JSON over the WebSocket: every message carries a
//! `type` field, and request/callback correlation rides on `req_id`.
//! Streaming responses (positions, account values, bars) arrive as rows
//! followed by an explicit end marker.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{AccountSummary, Bar, OrderSide, OrderStatus, OrderType, Position};
use crate::pending::RequestId;

/// `req_id` value meaning "not tied to any request".
pub const NO_REQUEST: RequestId = 0;

/// Venue error codes in this range signal connectivity faults rather than
/// per-request failures.
const CONNECTIVITY_CODE_RANGE: std::ops::Range<i32> = 1100..1200;

/// Whether a venue error code represents a connectivity fault.
#[must_use]
pub const fn is_connectivity_fault(code: i32) -> bool {
    code >= CONNECTIVITY_CODE_RANGE.start && code < CONNECTIVITY_CODE_RANGE.end
}

/// Client → venue requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VenueRequest {
    /// Session handshake, first message after the socket opens.
    Handshake {
        /// Correlation id.
        req_id: RequestId,
        /// Account to bind the session to.
        account: String,
    },
    /// Submit an order.
    PlaceOrder {
        /// Correlation id.
        req_id: RequestId,
        /// Instrument symbol.
        symbol: String,
        /// Buy or sell.
        side: OrderSide,
        /// Order type.
        order_type: OrderType,
        /// Share count.
        quantity: u32,
        /// Limit price, when applicable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit_price: Option<Decimal>,
        /// Stop trigger, when applicable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_price: Option<Decimal>,
        /// Client-side idempotency id.
        client_order_id: String,
    },
    /// Cancel a working order.
    CancelOrder {
        /// Correlation id.
        req_id: RequestId,
        /// Venue order id to cancel.
        order_id: String,
    },
    /// Request the position snapshot stream.
    Positions {
        /// Correlation id.
        req_id: RequestId,
    },
    /// Request the account-value stream.
    Account {
        /// Correlation id.
        req_id: RequestId,
    },
    /// Open a transient market data subscription.
    Subscribe {
        /// Correlation id, reused by ticks and the unsubscribe.
        req_id: RequestId,
        /// Instrument symbol.
        symbol: String,
    },
    /// Close a transient subscription.
    Unsubscribe {
        /// The subscription's correlation id.
        req_id: RequestId,
    },
    /// Request historical bars.
    HistoricalBars {
        /// Correlation id.
        req_id: RequestId,
        /// Instrument symbol.
        symbol: String,
        /// Bar size label understood by the venue (e.g. "1m", "1d").
        bar_size: String,
        /// Maximum number of bars.
        limit: u32,
    },
}

impl VenueRequest {
    /// The correlation id this request carries.
    #[must_use]
    pub const fn req_id(&self) -> RequestId {
        match self {
            Self::Handshake { req_id, .. }
            | Self::PlaceOrder { req_id, .. }
            | Self::CancelOrder { req_id, .. }
            | Self::Positions { req_id }
            | Self::Account { req_id }
            | Self::Subscribe { req_id, .. }
            | Self::Unsubscribe { req_id }
            | Self::HistoricalBars { req_id, .. } => *req_id,
        }
    }

    /// Short label for logging.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::PlaceOrder { .. } => "place_order",
            Self::CancelOrder { .. } => "cancel_order",
            Self::Positions { .. } => "positions",
            Self::Account { .. } => "account",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::HistoricalBars { .. } => "historical_bars",
        }
    }
}

/// A streamed position row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRow {
    /// Instrument symbol.
    pub symbol: String,
    /// Signed share count.
    pub quantity: i64,
    /// Average acquisition cost.
    pub avg_cost: Decimal,
    /// Last known price, if the venue includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,
    /// Settlement currency.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl From<PositionRow> for Position {
    fn from(row: PositionRow) -> Self {
        Self {
            symbol: row.symbol,
            quantity: row.quantity,
            avg_cost: row.avg_cost,
            last_price: row.last_price,
            currency: row.currency,
        }
    }
}

/// A streamed historical bar row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarRow {
    /// Bar open time.
    pub timestamp: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: u64,
}

impl From<BarRow> for Bar {
    fn from(row: BarRow) -> Self {
        Self {
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

/// Venue → client callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VenueCallback {
    /// Handshake accepted.
    Connected {
        /// The handshake's correlation id.
        req_id: RequestId,
        /// Venue protocol version.
        server_version: u32,
    },
    /// Order accepted by the venue.
    OrderAck {
        /// The submission's correlation id.
        req_id: RequestId,
        /// Venue-assigned order id.
        order_id: String,
    },
    /// Unsolicited order lifecycle update.
    OrderStatus {
        /// Venue order id.
        order_id: String,
        /// New lifecycle status.
        status: OrderStatus,
        /// Cumulative filled quantity.
        filled_quantity: u32,
        /// Volume-weighted average fill price.
        avg_fill_price: Decimal,
    },
    /// Cancel request resolved.
    CancelAck {
        /// The cancel's correlation id.
        req_id: RequestId,
        /// The order id the cancel referred to.
        order_id: String,
        /// `false` when the venue does not know the order id.
        known: bool,
    },
    /// One position row of a snapshot stream.
    Position {
        /// The snapshot's correlation id.
        req_id: RequestId,
        /// The row.
        #[serde(flatten)]
        row: PositionRow,
    },
    /// End of the position snapshot stream.
    PositionsEnd {
        /// The snapshot's correlation id.
        req_id: RequestId,
    },
    /// One account key/value row.
    AccountValue {
        /// The snapshot's correlation id.
        req_id: RequestId,
        /// Field name (e.g. `cash_balance`, `buying_power`).
        key: String,
        /// Field value, decimal rendered as a string.
        value: String,
        /// Currency the value is denominated in.
        currency: String,
    },
    /// End of the account-value stream.
    AccountEnd {
        /// The snapshot's correlation id.
        req_id: RequestId,
        /// The venue account id.
        account_id: String,
    },
    /// A market data tick for a transient subscription.
    Tick {
        /// The subscription's correlation id.
        req_id: RequestId,
        /// Instrument symbol.
        symbol: String,
        /// Last trade price.
        price: Decimal,
    },
    /// One historical bar row.
    Bar {
        /// The download's correlation id.
        req_id: RequestId,
        /// The row.
        #[serde(flatten)]
        row: BarRow,
    },
    /// End of a historical download.
    BarsEnd {
        /// The download's correlation id.
        req_id: RequestId,
    },
    /// Venue error, per-request (`req_id` > 0) or connection-level (0).
    Error {
        /// Correlation id, 0 when not tied to a request.
        req_id: RequestId,
        /// Venue error code.
        code: i32,
        /// Venue error text.
        message: String,
    },
}

/// Completion payloads delivered through the pending-request table.
#[derive(Debug, Clone)]
pub enum VenueResponse {
    /// Handshake completed.
    Connected,
    /// Order accepted, venue id assigned.
    OrderAccepted {
        /// Venue-assigned order id.
        order_id: String,
    },
    /// Cancel resolved; `known` is false for an unrecognized order id.
    CancelOutcome {
        /// Whether the venue knew the order.
        known: bool,
    },
    /// Position snapshot.
    Positions(Vec<Position>),
    /// Account snapshot.
    Account(AccountSummary),
    /// First tick of a transient subscription.
    Price(Decimal),
    /// Historical bars in venue order.
    Bars(Vec<Bar>),
}
