//! Protocol session.
//!
//! One session owns one WebSocket connection to the venue. A single spawned
//! task runs the receive loop; it is the only writer of the state cache and
//! the only completer of pending requests, so no callback ordering races
//! exist by construction.
//!
//! Commands arrive on a process-long mpsc channel whose receiver is shared
//! across session generations behind an async mutex: when a session dies the
//! lock releases, queued commands wait, and the next session drains them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;
use crate::models::{AccountSummary, Bar, Order, OrderStatus, Position};
use crate::pending::{PendingRequests, RequestId};
use crate::resilience::CircuitBreaker;
use crate::venue::codec;
use crate::venue::messages::{NO_REQUEST, VenueCallback, VenueRequest, VenueResponse, is_connectivity_fault};
use crate::venue::state::VenueStateCache;

type VenueSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a session's receive loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Explicit disconnect or process shutdown.
    Shutdown,
    /// The socket dropped, errored, or a wire message failed to decode.
    ConnectionLost {
        /// What ended the session.
        reason: String,
    },
}

/// A live venue connection plus the callback dispatch state.
pub struct Session {
    ws: VenueSocket,
    dispatcher: CallbackDispatcher,
}

impl Session {
    /// Connect the socket and send the handshake.
    ///
    /// The handshake's pending entry must already exist; the `connected`
    /// callback completes it once [`Session::run`] is spawned.
    pub async fn open(
        url: &str,
        handshake: VenueRequest,
        pending: Arc<PendingRequests<VenueResponse>>,
        cache: Arc<VenueStateCache>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, GatewayError> {
        let (mut ws, _response) =
            connect_async(url)
                .await
                .map_err(|err| GatewayError::ConnectionLost {
                    reason: format!("connect to {url} failed: {err}"),
                })?;

        let encoded = codec::encode_request(&handshake)?;
        ws.send(Message::Text(encoded.into()))
            .await
            .map_err(|err| GatewayError::ConnectionLost {
                reason: format!("handshake send failed: {err}"),
            })?;

        tracing::info!(url = %url, "venue socket opened, handshake sent");

        Ok(Self {
            ws,
            dispatcher: CallbackDispatcher::new(pending, cache, breaker),
        })
    }

    /// Run the receive loop until the socket dies or shutdown is requested.
    ///
    /// The loop never exits without releasing pending waiters.
    pub async fn run(
        self,
        commands: Arc<Mutex<mpsc::Receiver<VenueRequest>>>,
        shutdown: CancellationToken,
    ) -> SessionEnd {
        let Self { ws, mut dispatcher } = self;
        let (mut write, mut read) = ws.split();
        let mut commands = commands.lock().await;

        let end = loop {
            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = dispatcher.handle_text(text.as_str()) {
                            break SessionEnd::ConnectionLost { reason: err.to_string() };
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            break SessionEnd::ConnectionLost {
                                reason: "pong send failed".to_string(),
                            };
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break SessionEnd::ConnectionLost {
                            reason: frame.map_or_else(
                                || "venue closed connection".to_string(),
                                |f| format!("venue closed connection: {}", f.reason),
                            ),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        break SessionEnd::ConnectionLost {
                            reason: format!("socket error: {err}"),
                        };
                    }
                    None => {
                        break SessionEnd::ConnectionLost {
                            reason: "socket stream ended".to_string(),
                        };
                    }
                },
                command = commands.recv() => match command {
                    Some(request) => {
                        let req_id = request.req_id();
                        if matches!(request, VenueRequest::PlaceOrder { .. }) {
                            dispatcher.register_order_intent(&request);
                        }
                        let encoded = match codec::encode_request(&request) {
                            Ok(encoded) => encoded,
                            Err(err) => {
                                dispatcher.pending.complete(req_id, Err(err));
                                continue;
                            }
                        };
                        tracing::debug!(req_id, command = request.label(), "sending command");
                        if let Err(err) = write.send(Message::Text(encoded.into())).await {
                            break SessionEnd::ConnectionLost {
                                reason: format!("command send failed: {err}"),
                            };
                        }
                    }
                    None => {
                        break SessionEnd::ConnectionLost {
                            reason: "command channel closed".to_string(),
                        };
                    }
                },
                () = shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break SessionEnd::Shutdown;
                }
            }
        };

        match &end {
            SessionEnd::Shutdown => {
                tracing::info!("venue session shut down");
                dispatcher.pending.fail_all(&GatewayError::Cancelled);
            }
            SessionEnd::ConnectionLost { reason } => {
                tracing::warn!(reason = %reason, "venue session lost");
                dispatcher.pending.fail_all(&GatewayError::ConnectionLost {
                    reason: reason.clone(),
                });
            }
        }

        end
    }
}

/// Callback dispatch: completes pending requests and writes the cache.
///
/// Separate from the socket so the dispatch rules are testable without I/O.
struct CallbackDispatcher {
    pending: Arc<PendingRequests<VenueResponse>>,
    cache: Arc<VenueStateCache>,
    breaker: Arc<CircuitBreaker>,
    position_buffers: HashMap<RequestId, Vec<Position>>,
    account_buffers: HashMap<RequestId, AccountSummary>,
    bar_buffers: HashMap<RequestId, Vec<Bar>>,
    order_intents: HashMap<RequestId, Order>,
}

impl CallbackDispatcher {
    fn new(
        pending: Arc<PendingRequests<VenueResponse>>,
        cache: Arc<VenueStateCache>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            pending,
            cache,
            breaker,
            position_buffers: HashMap::new(),
            account_buffers: HashMap::new(),
            bar_buffers: HashMap::new(),
            order_intents: HashMap::new(),
        }
    }

    /// Remember the order a submission command described, so the ack can
    /// seed the cache before any fill callback refers to the venue id.
    fn register_order_intent(&mut self, request: &VenueRequest) {
        if let VenueRequest::PlaceOrder {
            req_id,
            symbol,
            side,
            order_type,
            quantity,
            limit_price,
            stop_price,
            client_order_id,
        } = request
        {
            let order = Order {
                order_id: String::new(),
                client_order_id: client_order_id.clone(),
                symbol: symbol.clone(),
                side: *side,
                order_type: *order_type,
                quantity: *quantity,
                limit_price: *limit_price,
                stop_price: *stop_price,
                status: OrderStatus::Pending,
                filled_quantity: 0,
                avg_fill_price: Decimal::ZERO,
                submitted_at: None,
                filled_at: None,
            };
            // intents whose submissions already timed out or failed are
            // dead; sweep them so the map stays bounded by live requests
            self.order_intents.retain(|id, _| self.pending.contains(*id));
            self.order_intents.insert(*req_id, order);
        }
    }

    /// Decode one wire message and dispatch it.
    ///
    /// A decode failure is a protocol fault and ends the session.
    fn handle_text(&mut self, text: &str) -> Result<(), GatewayError> {
        let callback = codec::decode_callback(text)?;
        self.dispatch(callback);
        Ok(())
    }

    fn dispatch(&mut self, callback: VenueCallback) {
        match callback {
            VenueCallback::Connected { req_id, server_version } => {
                tracing::info!(server_version, "venue handshake accepted");
                self.pending.complete(req_id, Ok(VenueResponse::Connected));
            }
            VenueCallback::OrderAck { req_id, order_id } => {
                tracing::info!(req_id, order_id = %order_id, "order acknowledged");
                if let Some(mut order) = self.order_intents.remove(&req_id) {
                    order.order_id = order_id.clone();
                    order.status = OrderStatus::Submitted;
                    order.submitted_at = Some(Utc::now());
                    self.cache.upsert_order(order);
                }
                self.pending
                    .complete(req_id, Ok(VenueResponse::OrderAccepted { order_id }));
            }
            VenueCallback::OrderStatus {
                order_id,
                status,
                filled_quantity,
                avg_fill_price,
            } => {
                tracing::info!(
                    order_id = %order_id,
                    status = %status,
                    filled_quantity,
                    "order status update"
                );
                if !self
                    .cache
                    .update_order_status(&order_id, status, filled_quantity, avg_fill_price)
                {
                    tracing::warn!(order_id = %order_id, "status update for unknown order");
                }
            }
            VenueCallback::CancelAck { req_id, order_id, known } => {
                if known && let Some(order) = self.cache.order(&order_id) {
                    self.cache.update_order_status(
                        &order_id,
                        OrderStatus::Cancelled,
                        order.filled_quantity,
                        order.avg_fill_price,
                    );
                }
                self.pending
                    .complete(req_id, Ok(VenueResponse::CancelOutcome { known }));
            }
            VenueCallback::Position { req_id, row } => {
                if self.pending.contains(req_id) {
                    self.position_buffers.entry(req_id).or_default().push(row.into());
                } else {
                    self.position_buffers.remove(&req_id);
                    tracing::debug!(req_id, "position row for a dead request, dropped");
                }
            }
            VenueCallback::PositionsEnd { req_id } => {
                let buffered = self.position_buffers.remove(&req_id);
                if !self.pending.contains(req_id) {
                    // a late end marker must not publish a stale snapshot
                    tracing::debug!(req_id, "positions end for a dead request, dropped");
                    return;
                }
                let positions = buffered.unwrap_or_default();
                self.cache.replace_positions(positions.clone());
                self.pending
                    .complete(req_id, Ok(VenueResponse::Positions(positions)));
            }
            VenueCallback::AccountValue { req_id, key, value, currency } => {
                if self.pending.contains(req_id) {
                    let summary = self.account_buffers.entry(req_id).or_default();
                    codec::apply_account_value(summary, &key, &value, &currency);
                } else {
                    self.account_buffers.remove(&req_id);
                    tracing::debug!(req_id, "account row for a dead request, dropped");
                }
            }
            VenueCallback::AccountEnd { req_id, account_id } => {
                let buffered = self.account_buffers.remove(&req_id);
                if !self.pending.contains(req_id) {
                    tracing::debug!(req_id, "account end for a dead request, dropped");
                    return;
                }
                let mut summary = buffered.unwrap_or_default();
                summary.account_id = account_id;
                self.cache.replace_account(summary.clone());
                self.pending
                    .complete(req_id, Ok(VenueResponse::Account(summary)));
            }
            VenueCallback::Tick { req_id, symbol, price } => {
                self.cache.record_price(&symbol, price);
                // first tick completes the snapshot; later ticks for the
                // same subscription find no entry and are dropped
                self.pending.complete(req_id, Ok(VenueResponse::Price(price)));
            }
            VenueCallback::Bar { req_id, row } => {
                if self.pending.contains(req_id) {
                    self.bar_buffers.entry(req_id).or_default().push(row.into());
                } else {
                    self.bar_buffers.remove(&req_id);
                    tracing::debug!(req_id, "bar row for a dead request, dropped");
                }
            }
            VenueCallback::BarsEnd { req_id } => {
                let bars = self.bar_buffers.remove(&req_id).unwrap_or_default();
                if self.pending.contains(req_id) {
                    self.pending.complete(req_id, Ok(VenueResponse::Bars(bars)));
                }
            }
            VenueCallback::Error { req_id, code, message } => {
                if req_id == NO_REQUEST {
                    tracing::warn!(code, message = %message, "venue connection-level error");
                    if is_connectivity_fault(code) {
                        self.breaker.record_failure();
                    }
                } else {
                    self.order_intents.remove(&req_id);
                    self.pending
                        .complete(req_id, Err(GatewayError::VenueRejection { code, message }));
                }
            }
        }
    }
}
