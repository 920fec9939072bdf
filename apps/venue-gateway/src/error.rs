//! Gateway error taxonomy.
//!
//! Every fallible gateway operation returns `Result<_, GatewayError>`.
//! Validation failures are deliberately NOT errors; they are returned as
//! values from the risk pipeline so callers can branch without matching on
//! an error enum.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by gateway operations.
///
/// The enum is `Clone` because a single disconnect fails every in-flight
/// request with the same error.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No session is established and no reconnect is in flight.
    #[error("not connected to venue")]
    NotConnected,

    /// The session dropped while the request was in flight.
    #[error("connection to venue lost: {reason}")]
    ConnectionLost {
        /// What ended the session.
        reason: String,
    },

    /// The circuit breaker is open; connection attempts are refused.
    #[error("circuit breaker open, retry in {retry_after:?}")]
    CircuitOpen {
        /// Remaining cooldown before a trial attempt is allowed.
        retry_after: Duration,
    },

    /// The venue did not answer within the operation's deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Which operation timed out.
        operation: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The venue answered the request with an error callback.
    #[error("venue rejected request: [{code}] {message}")]
    VenueRejection {
        /// Venue error code.
        code: i32,
        /// Venue error text.
        message: String,
    },

    /// No tick arrived for a transient market-data subscription.
    #[error("no market data received for {symbol}")]
    NoMarketData {
        /// The subscribed symbol.
        symbol: String,
    },

    /// The request was abandoned by an explicit disconnect or shutdown.
    #[error("request cancelled")]
    Cancelled,

    /// A wire message could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// What failed to round-trip.
        message: String,
    },

    /// A command could not be handed to the session task.
    #[error("failed to send command to session: {message}")]
    SendFailed {
        /// Channel-level failure detail.
        message: String,
    },
}

impl GatewayError {
    /// Stable machine-readable code for HTTP bodies and logs.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::ConnectionLost { .. } => "CONNECTION_LOST",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Timeout { .. } => "TIMEOUT",
            Self::VenueRejection { .. } => "VENUE_REJECTION",
            Self::NoMarketData { .. } => "NO_MARKET_DATA",
            Self::Cancelled => "CANCELLED",
            Self::Codec { .. } => "CODEC",
            Self::SendFailed { .. } => "SEND_FAILED",
        }
    }

    /// HTTP status for the REST facade.
    ///
    /// Connectivity faults map to 503, deadline misses to 504, venue-side
    /// rejections to 502, and absent market data to 404.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::NotConnected | Self::ConnectionLost { .. } | Self::CircuitOpen { .. } => 503,
            Self::Timeout { .. } => 504,
            Self::VenueRejection { .. } => 502,
            Self::NoMarketData { .. } => 404,
            Self::Cancelled | Self::Codec { .. } | Self::SendFailed { .. } => 500,
        }
    }

    /// Structured JSON body for HTTP error responses.
    #[must_use]
    pub fn to_http_response(&self) -> HttpErrorResponse {
        HttpErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// JSON error body returned by the HTTP facade.
#[derive(Debug, Clone, Serialize)]
pub struct HttpErrorResponse {
    /// Stable error code.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_map_to_503() {
        assert_eq!(GatewayError::NotConnected.http_status(), 503);
        assert_eq!(
            GatewayError::ConnectionLost { reason: "eof".to_string() }.http_status(),
            503
        );
        assert_eq!(
            GatewayError::CircuitOpen { retry_after: Duration::from_secs(5) }.http_status(),
            503
        );
    }

    #[test]
    fn timeout_maps_to_504() {
        let err = GatewayError::Timeout {
            operation: "get_positions".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.http_status(), 504);
        assert_eq!(err.code(), "TIMEOUT");
    }

    #[test]
    fn venue_rejection_maps_to_502_with_code_in_message() {
        let err = GatewayError::VenueRejection {
            code: 201,
            message: "order rejected".to_string(),
        };
        assert_eq!(err.http_status(), 502);
        assert!(err.to_string().contains("201"));
    }

    #[test]
    fn http_response_body_carries_code_and_message() {
        let body = GatewayError::NoMarketData { symbol: "AAPL".to_string() }.to_http_response();
        assert_eq!(body.code, "NO_MARKET_DATA");
        assert!(body.message.contains("AAPL"));
    }
}
