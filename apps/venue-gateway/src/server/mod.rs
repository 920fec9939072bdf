//! HTTP facade for the gateway.

mod http;

pub use http::{build_router, serve};
