//! Venue protocol layer.
//!
//! Wire message types, the JSON codec, the single-writer protocol session,
//! and the state cache the session publishes into.

pub mod codec;
pub mod messages;
pub mod session;
pub mod state;

pub use messages::{VenueCallback, VenueRequest, VenueResponse};
pub use session::{Session, SessionEnd};
pub use state::VenueStateCache;
