//! Pending-request table.
//!
//! Correlates outbound requests with the venue's asynchronous callbacks.
//! Each request gets a process-lifetime-unique id and a oneshot slot; the
//! session task completes the slot when the matching callback arrives, and
//! the caller suspends on the receiver under a deadline. Ids are never
//! recycled, so a late callback for a timed-out request can only miss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::GatewayError;

/// Request correlation id.
pub type RequestId = u64;

/// What a pending entry is waiting for. Used for logging and timeout text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Venue handshake.
    Connect,
    /// Order submission awaiting `order_ack`.
    PlaceOrder,
    /// Cancel awaiting `cancel_ack`.
    CancelOrder,
    /// Position snapshot awaiting `positions_end`.
    Positions,
    /// Account snapshot awaiting `account_end`.
    Account,
    /// Transient subscription awaiting the first tick.
    MarketData,
    /// Historical download awaiting `bars_end`.
    HistoricalBars,
}

impl RequestKind {
    /// Operation name used in timeout errors and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::PlaceOrder => "place_order",
            Self::CancelOrder => "cancel_order",
            Self::Positions => "get_positions",
            Self::Account => "get_account",
            Self::MarketData => "get_market_price",
            Self::HistoricalBars => "get_historical_bars",
        }
    }
}

struct PendingEntry<T> {
    kind: RequestKind,
    tx: oneshot::Sender<Result<T, GatewayError>>,
}

/// Table of in-flight requests keyed by correlation id.
///
/// Generic over the completion payload so the protocol response type stays
/// out of this module; the gateway instantiates it with the venue response
/// enum.
pub struct PendingRequests<T> {
    next_id: AtomicU64,
    entries: Mutex<HashMap<RequestId, PendingEntry<T>>>,
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingRequests<T> {
    /// Empty table; ids start at 1 so 0 can mean "no request" on the wire.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new in-flight request.
    ///
    /// Returns the wire id and the receiver the caller suspends on.
    pub fn create(
        &self,
        kind: RequestKind,
    ) -> (RequestId, oneshot::Receiver<Result<T, GatewayError>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(id, PendingEntry { kind, tx });
        (id, rx)
    }

    /// Complete a request, releasing its waiter.
    ///
    /// At most one completion wins; an unknown or already-completed id is a
    /// warn-logged no-op. Returns whether a waiter was released.
    pub fn complete(&self, id: RequestId, result: Result<T, GatewayError>) -> bool {
        let entry = self.entries.lock().remove(&id);
        match entry {
            Some(entry) => {
                if entry.tx.send(result).is_err() {
                    tracing::debug!(
                        req_id = id,
                        kind = entry.kind.as_str(),
                        "waiter gone before completion"
                    );
                }
                true
            }
            None => {
                tracing::warn!(req_id = id, "completion for unknown or finished request");
                false
            }
        }
    }

    /// Remove an entry without completing it.
    ///
    /// Used when the awaiting caller goes away (timeout or drop). Safe to
    /// call after completion; returns whether an entry was removed.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Fail every in-flight request with the same error.
    ///
    /// Called on disconnect and shutdown so no waiter is ever orphaned.
    pub fn fail_all(&self, error: &GatewayError) {
        let drained: Vec<(RequestId, PendingEntry<T>)> =
            self.entries.lock().drain().collect();
        if drained.is_empty() {
            return;
        }
        tracing::warn!(count = drained.len(), error = %error, "failing all pending requests");
        for (id, entry) in drained {
            if entry.tx.send(Err(error.clone())).is_err() {
                tracing::debug!(req_id = id, "waiter gone during fail_all");
            }
        }
    }

    /// Whether a request is still in flight.
    ///
    /// The session consults this before buffering streamed rows, so a
    /// request that timed out stops accumulating state.
    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Number of in-flight requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Suspend on a pending request's receiver under a deadline.
    ///
    /// On timeout the entry is removed so a late callback becomes a no-op,
    /// and `Timeout` is returned. If the sender side vanishes without a
    /// completion (session task aborted), the entry is removed and a
    /// connection-lost error is returned.
    pub async fn await_response(
        &self,
        id: RequestId,
        rx: oneshot::Receiver<Result<T, GatewayError>>,
        deadline: Duration,
        kind: RequestKind,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_closed)) => {
                self.cancel(id);
                Err(GatewayError::ConnectionLost {
                    reason: "completion channel closed".to_string(),
                })
            }
            Err(_elapsed) => {
                self.cancel(id);
                tracing::warn!(
                    req_id = id,
                    operation = kind.as_str(),
                    timeout_secs = deadline.as_secs_f64(),
                    "request timed out"
                );
                Err(GatewayError::Timeout {
                    operation: kind.as_str().to_string(),
                    timeout: deadline,
                })
            }
        }
    }
}

impl<T> std::fmt::Debug for PendingRequests<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("in_flight", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ids_are_monotonic_and_start_at_one() {
        let table: PendingRequests<u32> = PendingRequests::new();
        let (a, _rx_a) = table.create(RequestKind::Positions);
        let (b, _rx_b) = table.create(RequestKind::Account);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn complete_releases_exactly_one_waiter() {
        let table: PendingRequests<u32> = PendingRequests::new();
        let (id, rx) = table.create(RequestKind::PlaceOrder);

        assert!(table.complete(id, Ok(42)));
        assert_eq!(rx.await.unwrap().unwrap(), 42);

        // second completion is a no-op
        assert!(!table.complete(id, Ok(99)));
    }

    #[tokio::test]
    async fn timeout_removes_entry_and_late_callback_misses() {
        let table: PendingRequests<u32> = PendingRequests::new();
        let (id, rx) = table.create(RequestKind::Positions);

        let result = table
            .await_response(id, rx, Duration::from_millis(10), RequestKind::Positions)
            .await;
        assert!(matches!(result, Err(GatewayError::Timeout { .. })));
        assert!(table.is_empty());

        // the late callback cannot complete anything
        assert!(!table.complete(id, Ok(1)));
    }

    #[tokio::test]
    async fn fail_all_releases_every_waiter() {
        let table: PendingRequests<u32> = PendingRequests::new();
        let (_id1, rx1) = table.create(RequestKind::Positions);
        let (_id2, rx2) = table.create(RequestKind::Account);

        table.fail_all(&GatewayError::ConnectionLost { reason: "eof".to_string() });

        assert!(matches!(rx1.await.unwrap(), Err(GatewayError::ConnectionLost { .. })));
        assert!(matches!(rx2.await.unwrap(), Err(GatewayError::ConnectionLost { .. })));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn cancel_then_complete_is_noop() {
        let table: PendingRequests<u32> = PendingRequests::new();
        let (id, rx) = table.create(RequestKind::MarketData);

        assert!(table.cancel(id));
        drop(rx);
        assert!(!table.complete(id, Ok(7)));
        assert!(!table.cancel(id));
    }

    #[tokio::test]
    async fn await_response_surfaces_completion_error() {
        let table: PendingRequests<u32> = PendingRequests::new();
        let (id, rx) = table.create(RequestKind::PlaceOrder);

        table.complete(
            id,
            Err(GatewayError::VenueRejection { code: 201, message: "no".to_string() }),
        );

        let result = table
            .await_response(id, rx, Duration::from_secs(1), RequestKind::PlaceOrder)
            .await;
        assert!(matches!(result, Err(GatewayError::VenueRejection { code: 201, .. })));
    }

    proptest! {
        // Whatever order completions, cancels, and duplicates arrive in,
        // each request releases its waiter at most once.
        #[test]
        fn at_most_one_completion_wins(ops in proptest::collection::vec(0u8..3, 1..20)) {
            let table: PendingRequests<u32> = PendingRequests::new();
            let (id, mut rx) = table.create(RequestKind::PlaceOrder);

            let mut releases = 0u32;
            for op in ops {
                let released = match op {
                    0 => table.complete(id, Ok(1)),
                    1 => table.complete(
                        id,
                        Err(GatewayError::Cancelled),
                    ),
                    _ => {
                        table.cancel(id);
                        false
                    }
                };
                if released {
                    releases += 1;
                }
            }

            prop_assert!(releases <= 1);
            // the receiver observes at most one value
            let mut received = 0;
            if rx.try_recv().is_ok() {
                received += 1;
            }
            prop_assert!(received <= 1);
            prop_assert!(table.is_empty());
        }
    }
}
