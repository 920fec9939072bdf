//! Pre-trade risk checks.

mod validation;

pub use validation::{OrderValidator, ValidationContext, ValidationOutcome};
