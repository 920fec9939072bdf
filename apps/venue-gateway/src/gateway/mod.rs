//! Gateway facade.
//!
//! The one public surface callers use: connect, trade, query, observe.

mod core;

pub use core::{GatewayStatus, PlaceOrderOutcome, VenueGateway};
