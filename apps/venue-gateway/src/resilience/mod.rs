//! Connection resilience: circuit breaker and reconnect backoff.

mod circuit_breaker;
mod reconnect;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
