//! Venue Gateway
//!
//! Execution gateway for a brokerage venue's callback-driven trading
//! protocol. The venue answers requests asynchronously over a single
//! WebSocket; this crate turns that into a blocking-style async API:
//!
//! - **pending**: correlates outbound requests with venue callbacks
//! - **venue**: wire messages, codec, the single-writer protocol session,
//!   and the state cache it publishes into
//! - **resilience**: circuit breaker and deterministic reconnect backoff
//! - **risk**: ordered pre-trade validation returning values, not errors
//! - **gateway**: the facade callers use (connect/trade/query/status)
//! - **server**: thin HTTP surface over the facade
//! - **persistence**: trade journal port

// Test code is allowed to unwrap
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod pending;
pub mod persistence;
pub mod resilience;
pub mod risk;
pub mod server;
pub mod telemetry;
pub mod venue;

pub use error::GatewayError;
pub use gateway::{GatewayStatus, PlaceOrderOutcome, VenueGateway};
pub use models::{AccountSummary, Bar, Order, OrderSide, OrderStatus, OrderTicket, OrderType, Position};
