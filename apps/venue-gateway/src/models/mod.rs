//! Core data model for the venue gateway.
//!
//! These types mirror the venue's view of the world: orders and their
//! lifecycle, position rows, the account summary, and historical bars.
//! They are plain data; all mutation goes through the venue state cache.

mod account;
mod market;
mod order;
mod position;

pub use account::AccountSummary;
pub use market::Bar;
pub use order::{Order, OrderSide, OrderStatus, OrderTicket, OrderType};
pub use position::Position;
