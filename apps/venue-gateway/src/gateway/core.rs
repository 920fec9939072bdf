//! The gateway facade.
//!
//! Wraps the protocol session, pending-request table, circuit breaker,
//! state cache, and risk pipeline behind blocking-style async calls. A
//! single connect mutex serializes `connect`, `disconnect`, and the
//! reconnection supervisor's attempts, so at most one session exists at a
//! time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::GatewayError;
use crate::models::{AccountSummary, Bar, Order, OrderStatus, OrderTicket, Position};
use crate::pending::{PendingRequests, RequestId, RequestKind};
use crate::persistence::{TradeRecord, TradeStore};
use crate::resilience::{CircuitBreaker, CircuitBreakerSnapshot, ReconnectPolicy};
use crate::risk::{OrderValidator, ValidationContext};
use crate::venue::messages::{VenueRequest, VenueResponse};
use crate::venue::session::{Session, SessionEnd};
use crate::venue::state::VenueStateCache;

/// Hard ceiling on a single historical download.
const MAX_BAR_LIMIT: u32 = 5_000;

/// Capacity of the command channel shared across session generations.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Result of `place_order`: validation rejections are values, not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlaceOrderOutcome {
    /// The order passed validation and the venue acknowledged it.
    Accepted(Order),
    /// The validation pipeline refused the order; nothing hit the wire.
    Rejected {
        /// The first failing check's reason.
        reason: String,
    },
}

/// Point-in-time gateway status.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    /// Whether a session is established.
    pub connected: bool,
    /// Whether the reconnection supervisor is running.
    pub reconnecting: bool,
    /// In-flight correlated requests.
    pub pending_requests: usize,
    /// Successful initial connections.
    pub connections: u64,
    /// Successful automatic reconnections.
    pub reconnections: u64,
    /// Connection-level failures observed.
    pub failures: u64,
    /// Submission attempts that passed validation.
    pub orders_placed: u64,
    /// Orders the venue acknowledged.
    pub orders_succeeded: u64,
    /// Most recent failure reason, if any.
    pub last_failure: Option<String>,
    /// Breaker state and counters.
    pub circuit_breaker: CircuitBreakerSnapshot,
}

#[derive(Debug, Default)]
struct GatewayStats {
    connections: AtomicU64,
    reconnections: AtomicU64,
    failures: AtomicU64,
    orders_placed: AtomicU64,
    orders_succeeded: AtomicU64,
    last_failure: parking_lot::RwLock<Option<String>>,
}

#[derive(Default)]
struct ConnState {
    shutdown: Option<CancellationToken>,
}

struct Inner {
    config: Config,
    pending: Arc<PendingRequests<VenueResponse>>,
    cache: Arc<VenueStateCache>,
    breaker: Arc<CircuitBreaker>,
    validator: OrderValidator,
    trade_store: Arc<dyn TradeStore>,
    cmd_tx: mpsc::Sender<VenueRequest>,
    cmd_rx: Arc<Mutex<mpsc::Receiver<VenueRequest>>>,
    conn: Mutex<ConnState>,
    connected: AtomicBool,
    reconnecting: AtomicBool,
    /// Cleared by `disconnect()` so the supervisor stops reconnecting.
    want_connected: AtomicBool,
    stats: GatewayStats,
}

/// The execution gateway: one venue connection behind a request/response
/// facade. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct VenueGateway {
    inner: Arc<Inner>,
}

impl VenueGateway {
    /// Build a gateway from configuration and a trade journal backend.
    ///
    /// No connection is attempted until [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: Config, trade_store: Arc<dyn TradeStore>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let breaker = Arc::new(CircuitBreaker::new(
            "venue",
            config.circuit_breaker.to_breaker_config(),
        ));
        let validator = OrderValidator::new(config.risk.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                pending: Arc::new(PendingRequests::new()),
                cache: Arc::new(VenueStateCache::new()),
                breaker,
                validator,
                trade_store,
                cmd_tx,
                cmd_rx: Arc::new(Mutex::new(cmd_rx)),
                conn: Mutex::new(ConnState::default()),
                connected: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                want_connected: AtomicBool::new(false),
                stats: GatewayStats::default(),
            }),
        }
    }

    /// Whether a session is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Read-only view of the venue state cache.
    #[must_use]
    pub fn cache(&self) -> &VenueStateCache {
        &self.inner.cache
    }

    /// Establish a session with the venue.
    ///
    /// Gated by the circuit breaker; a failed attempt records a breaker
    /// failure. Already connected is a no-op.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let mut conn = self.inner.conn.lock().await;
        self.inner.want_connected.store(true, Ordering::SeqCst);
        if self.is_connected() {
            return Ok(());
        }
        if !self.inner.breaker.allow_attempt() {
            return Err(GatewayError::CircuitOpen {
                retry_after: self.inner.breaker.remaining_cooldown().unwrap_or_default(),
            });
        }

        match self.open_session(&mut conn).await {
            Ok(()) => {
                self.inner.breaker.record_success();
                Ok(())
            }
            Err(err) => {
                self.inner.breaker.record_failure();
                self.set_last_failure(&err.to_string());
                Err(err)
            }
        }
    }

    /// Tear the session down. Idempotent.
    ///
    /// Every in-flight request completes with `Cancelled` before the socket
    /// closes, so no waiter is orphaned.
    pub async fn disconnect(&self) {
        self.inner.want_connected.store(false, Ordering::SeqCst);
        let mut conn = self.inner.conn.lock().await;
        self.inner.pending.fail_all(&GatewayError::Cancelled);
        if let Some(token) = conn.shutdown.take() {
            tracing::info!("disconnect requested");
            token.cancel();
        }
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    /// Validate and submit an order.
    ///
    /// A validation failure returns `Rejected { reason }` without touching
    /// the wire. On success the returned order carries the venue id and
    /// status `Submitted`; a trade record goes to the journal without
    /// blocking the caller.
    pub async fn place_order(
        &self,
        ticket: OrderTicket,
    ) -> Result<PlaceOrderOutcome, GatewayError> {
        let account = self.inner.cache.account();
        let positions = self.inner.cache.positions();
        let last_price = self.inner.cache.last_price(&ticket.symbol);
        let ctx = ValidationContext {
            account: &account,
            positions: &positions,
            last_price,
        };

        let outcome = self.inner.validator.validate(&ticket, &ctx);
        if !outcome.valid {
            let reason = outcome
                .reason
                .unwrap_or_else(|| "order rejected".to_string());
            tracing::warn!(
                symbol = %ticket.symbol,
                side = %ticket.side,
                quantity = ticket.quantity,
                reason = %reason,
                "order rejected by validation"
            );
            return Ok(PlaceOrderOutcome::Rejected { reason });
        }

        let pending_order = Order::from_ticket(&ticket);
        self.inner.stats.orders_placed.fetch_add(1, Ordering::Relaxed);

        let response = self
            .request(
                RequestKind::PlaceOrder,
                self.inner.config.timeouts.request(),
                |req_id| VenueRequest::PlaceOrder {
                    req_id,
                    symbol: ticket.symbol.clone(),
                    side: ticket.side,
                    order_type: ticket.order_type,
                    quantity: ticket.quantity,
                    limit_price: ticket.limit_price,
                    stop_price: ticket.stop_price,
                    client_order_id: pending_order.client_order_id.clone(),
                },
            )
            .await?;

        let VenueResponse::OrderAccepted { order_id } = response else {
            return Err(unexpected_response(RequestKind::PlaceOrder, &response));
        };

        // the session seeds the cache at ack time; the lookup can only miss
        // if the session died between ack and now
        let order = self.inner.cache.order(&order_id).unwrap_or_else(|| {
            let mut order = pending_order;
            order.order_id = order_id.clone();
            order.status = OrderStatus::Submitted;
            order.submitted_at = Some(Utc::now());
            order
        });

        self.inner
            .stats
            .orders_succeeded
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = order.quantity,
            "order submitted"
        );

        self.journal_trade(&ticket, last_price);
        Ok(PlaceOrderOutcome::Accepted(order))
    }

    /// Cancel a working order.
    ///
    /// Returns `Ok(false)` when the venue does not recognize the id; that
    /// is an answer, not an error.
    pub async fn cancel_order(&self, order_id: &str) -> Result<bool, GatewayError> {
        let response = self
            .request(
                RequestKind::CancelOrder,
                self.inner.config.timeouts.request(),
                |req_id| VenueRequest::CancelOrder {
                    req_id,
                    order_id: order_id.to_string(),
                },
            )
            .await?;

        let VenueResponse::CancelOutcome { known } = response else {
            return Err(unexpected_response(RequestKind::CancelOrder, &response));
        };
        if !known {
            tracing::warn!(order_id = %order_id, "cancel requested for unknown order");
        }
        Ok(known)
    }

    /// Fetch the position snapshot from the venue.
    pub async fn get_positions(&self) -> Result<Vec<Position>, GatewayError> {
        let response = self
            .request(
                RequestKind::Positions,
                self.inner.config.timeouts.request(),
                |req_id| VenueRequest::Positions { req_id },
            )
            .await?;

        match response {
            VenueResponse::Positions(positions) => Ok(positions),
            other => Err(unexpected_response(RequestKind::Positions, &other)),
        }
    }

    /// Fetch the account summary from the venue.
    pub async fn get_account(&self) -> Result<AccountSummary, GatewayError> {
        let response = self
            .request(
                RequestKind::Account,
                self.inner.config.timeouts.request(),
                |req_id| VenueRequest::Account { req_id },
            )
            .await?;

        match response {
            VenueResponse::Account(account) => Ok(account),
            other => Err(unexpected_response(RequestKind::Account, &other)),
        }
    }

    /// One-shot market price: transient subscription, first tick wins.
    ///
    /// The subscription is always torn down, and a quiet symbol yields
    /// `NoMarketData` after the short market-data deadline.
    pub async fn get_market_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        self.ensure_can_send()?;

        let (req_id, rx) = self.inner.pending.create(RequestKind::MarketData);
        if let Err(err) = self
            .send_command(VenueRequest::Subscribe {
                req_id,
                symbol: symbol.to_string(),
            })
            .await
        {
            self.inner.pending.cancel(req_id);
            return Err(err);
        }

        let result = self
            .inner
            .pending
            .await_response(
                req_id,
                rx,
                self.inner.config.timeouts.market_data(),
                RequestKind::MarketData,
            )
            .await;

        // best effort; a dead session already dropped the subscription
        let _ = self.send_command(VenueRequest::Unsubscribe { req_id }).await;

        match result {
            Ok(VenueResponse::Price(price)) => Ok(price),
            Ok(other) => Err(unexpected_response(RequestKind::MarketData, &other)),
            Err(GatewayError::Timeout { .. }) => Err(GatewayError::NoMarketData {
                symbol: symbol.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    /// Download historical bars, bounded by [`MAX_BAR_LIMIT`].
    pub async fn get_historical_bars(
        &self,
        symbol: &str,
        bar_size: &str,
        limit: u32,
    ) -> Result<Vec<Bar>, GatewayError> {
        let capped = limit.min(MAX_BAR_LIMIT);
        if capped < limit {
            tracing::warn!(requested = limit, capped, "bar limit capped");
        }

        let response = self
            .request(
                RequestKind::HistoricalBars,
                self.inner.config.timeouts.historical(),
                |req_id| VenueRequest::HistoricalBars {
                    req_id,
                    symbol: symbol.to_string(),
                    bar_size: bar_size.to_string(),
                    limit: capped,
                },
            )
            .await?;

        match response {
            VenueResponse::Bars(bars) => Ok(bars),
            other => Err(unexpected_response(RequestKind::HistoricalBars, &other)),
        }
    }

    /// Point-in-time status snapshot.
    #[must_use]
    pub fn status(&self) -> GatewayStatus {
        let stats = &self.inner.stats;
        GatewayStatus {
            connected: self.is_connected(),
            reconnecting: self.inner.reconnecting.load(Ordering::SeqCst),
            pending_requests: self.inner.pending.len(),
            connections: stats.connections.load(Ordering::Relaxed),
            reconnections: stats.reconnections.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
            orders_placed: stats.orders_placed.load(Ordering::Relaxed),
            orders_succeeded: stats.orders_succeeded.load(Ordering::Relaxed),
            last_failure: stats.last_failure.read().clone(),
            circuit_breaker: self.inner.breaker.snapshot(),
        }
    }

    /// Breaker snapshot, for callers that only care about connectivity.
    #[must_use]
    pub fn breaker_snapshot(&self) -> CircuitBreakerSnapshot {
        self.inner.breaker.snapshot()
    }

    // ---- internals ----

    /// Open the socket, run the handshake, spawn the session and its
    /// supervisor. Caller holds the connect mutex and settles the breaker.
    async fn open_session(&self, conn: &mut ConnState) -> Result<(), GatewayError> {
        let inner = &self.inner;
        let (req_id, rx) = inner.pending.create(RequestKind::Connect);
        let handshake = VenueRequest::Handshake {
            req_id,
            account: inner.config.venue.account.clone(),
        };

        let session = match Session::open(
            &inner.config.venue.url,
            handshake,
            Arc::clone(&inner.pending),
            Arc::clone(&inner.cache),
            Arc::clone(&inner.breaker),
        )
        .await
        {
            Ok(session) => session,
            Err(err) => {
                inner.pending.cancel(req_id);
                return Err(err);
            }
        };

        let token = CancellationToken::new();
        let handle = tokio::spawn(session.run(Arc::clone(&inner.cmd_rx), token.clone()));

        match inner
            .pending
            .await_response(req_id, rx, inner.config.timeouts.connect(), RequestKind::Connect)
            .await
        {
            Ok(VenueResponse::Connected) => {}
            Ok(other) => {
                token.cancel();
                return Err(unexpected_response(RequestKind::Connect, &other));
            }
            Err(err) => {
                token.cancel();
                return Err(err);
            }
        }

        conn.shutdown = Some(token);
        inner.connected.store(true, Ordering::SeqCst);
        inner.stats.connections.fetch_add(1, Ordering::Relaxed);
        tracing::info!(url = %inner.config.venue.url, "connected to venue");

        self.spawn_supervisor(handle);
        Ok(())
    }

    /// Watch the session task and drive reconnection when it dies.
    ///
    /// Boxed so the supervise → reconnect → open_session → supervise cycle
    /// does not produce an infinitely sized future type.
    fn spawn_supervisor(&self, handle: tokio::task::JoinHandle<SessionEnd>) {
        let gateway = self.clone();
        let supervise: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            gateway.supervise(handle).await;
        });
        tokio::spawn(supervise);
    }

    async fn supervise(&self, handle: tokio::task::JoinHandle<SessionEnd>) {
        let end = match handle.await {
            Ok(end) => end,
            Err(err) => SessionEnd::ConnectionLost {
                reason: format!("session task failed: {err}"),
            },
        };

        match end {
            SessionEnd::Shutdown => {}
            SessionEnd::ConnectionLost { reason } => {
                self.inner.connected.store(false, Ordering::SeqCst);
                self.inner.stats.failures.fetch_add(1, Ordering::Relaxed);
                self.inner.breaker.record_failure();
                self.set_last_failure(&reason);
                if !self.inner.want_connected.load(Ordering::SeqCst) {
                    return;
                }
                tracing::warn!(reason = %reason, "venue connection lost, engaging reconnect");
                self.run_reconnect().await;
            }
        }
    }

    /// Reconnection loop: one attempt at a time, breaker consulted before
    /// each, backoff between attempts, bounded attempt count.
    async fn run_reconnect(&self) {
        let inner = &self.inner;
        inner.reconnecting.store(true, Ordering::SeqCst);
        let mut policy = ReconnectPolicy::new(inner.config.reconnect.to_policy_config());

        while let Some(delay) = policy.next_delay() {
            tokio::time::sleep(delay).await;

            // An open circuit postpones this attempt; waiting out the
            // cooldown spends neither the attempt nor a second backoff
            while let Some(remaining) = inner.breaker.remaining_cooldown() {
                tracing::info!(
                    remaining_secs = remaining.as_secs_f64(),
                    "circuit open, waiting out cooldown before next attempt"
                );
                tokio::time::sleep(remaining).await;
            }

            let mut conn = inner.conn.lock().await;
            if inner.connected.load(Ordering::SeqCst) {
                // an application connect() won the race
                break;
            }
            if !inner.want_connected.load(Ordering::SeqCst) {
                tracing::info!("disconnect requested, abandoning reconnect");
                break;
            }
            if !inner.breaker.allow_attempt() {
                // a concurrent connect() holds the half-open trial slot
                drop(conn);
                continue;
            }

            let attempt = policy.attempt();
            tracing::info!(attempt, "reconnect attempt");
            match self.open_session(&mut conn).await {
                Ok(()) => {
                    inner.breaker.record_success();
                    inner.stats.reconnections.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(attempt, "reconnected to venue");
                    break;
                }
                Err(err) => {
                    inner.breaker.record_failure();
                    self.set_last_failure(&err.to_string());
                    tracing::warn!(attempt, error = %err, "reconnect attempt failed");
                }
            }
        }

        if !inner.connected.load(Ordering::SeqCst) {
            tracing::error!("reconnect attempts exhausted, staying disconnected");
        }
        inner.reconnecting.store(false, Ordering::SeqCst);
    }

    /// Commands may be sent while connected or while a reconnect is in
    /// flight (they queue and drain when the next session connects).
    fn ensure_can_send(&self) -> Result<(), GatewayError> {
        if self.inner.connected.load(Ordering::SeqCst)
            || self.inner.reconnecting.load(Ordering::SeqCst)
        {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    async fn send_command(&self, request: VenueRequest) -> Result<(), GatewayError> {
        self.inner
            .cmd_tx
            .send(request)
            .await
            .map_err(|err| GatewayError::SendFailed {
                message: err.to_string(),
            })
    }

    /// Create a pending entry, send the command, await the completion.
    async fn request(
        &self,
        kind: RequestKind,
        deadline: Duration,
        build: impl FnOnce(RequestId) -> VenueRequest,
    ) -> Result<VenueResponse, GatewayError> {
        self.ensure_can_send()?;

        let (req_id, rx) = self.inner.pending.create(kind);
        if let Err(err) = self.send_command(build(req_id)).await {
            self.inner.pending.cancel(req_id);
            return Err(err);
        }
        self.inner
            .pending
            .await_response(req_id, rx, deadline, kind)
            .await
    }

    /// Hand a trade record to the journal without blocking the caller.
    fn journal_trade(&self, ticket: &OrderTicket, last_price: Option<Decimal>) {
        let store = Arc::clone(&self.inner.trade_store);
        let record = TradeRecord {
            symbol: ticket.symbol.clone(),
            side: ticket.side,
            quantity: ticket.quantity,
            price: ticket.limit_price.or(last_price).unwrap_or(Decimal::ZERO),
            strategy: "gateway".to_string(),
            costs: Decimal::ZERO,
            executed_at: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(err) = store.record_trade(record).await {
                tracing::warn!(error = %err, "failed to journal trade");
            }
        });
    }

    fn set_last_failure(&self, reason: &str) {
        *self.inner.stats.last_failure.write() = Some(reason.to_string());
    }
}

fn unexpected_response(kind: RequestKind, response: &VenueResponse) -> GatewayError {
    GatewayError::Codec {
        message: format!("unexpected response for {}: {response:?}", kind.as_str()),
    }
}

impl std::fmt::Debug for VenueGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueGateway")
            .field("connected", &self.is_connected())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}
