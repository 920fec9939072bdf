//! Gateway Integration Tests
//!
//! End-to-end tests against an in-process mock venue speaking the tagged
//! JSON protocol over WebSocket:
//! - Order lifecycle: validated LIMIT BUY through ack and fill
//! - Validation rejection without touching the wire
//! - Mid-request disconnect, breaker accounting, automatic reconnect
//! - Cancel of known and unknown orders
//! - One-shot market price and historical bars
//! - Circuit breaker opening after repeated failed connects

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use venue_gateway::config::Config;
use venue_gateway::error::GatewayError;
use venue_gateway::gateway::{PlaceOrderOutcome, VenueGateway};
use venue_gateway::models::{OrderSide, OrderStatus, OrderTicket};
use venue_gateway::persistence::InMemoryTradeStore;

/// How the mock venue behaves beyond the happy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VenueBehavior {
    /// Answer everything.
    Normal,
    /// Drop the socket when a positions request arrives.
    DropOnPositions,
    /// Accept a positions request and never answer it.
    IgnorePositions,
}

/// Spawn a mock venue and return its ws:// URL. Accepts any number of
/// connections, so reconnects land on the same script.
async fn spawn_mock_venue(behavior: VenueBehavior) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle_client(stream, behavior));
        }
    });

    format!("ws://{addr}")
}

async fn handle_client(stream: TcpStream, behavior: VenueBehavior) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let request: Value = serde_json::from_str(text.as_str()).unwrap();
        let req_id = request["req_id"].as_u64().unwrap_or(0);

        match request["type"].as_str().unwrap_or("") {
            "handshake" => {
                send(&mut ws, &json!({
                    "type": "connected", "req_id": req_id, "server_version": 176
                }))
                .await;
            }
            "place_order" => {
                let order_id = format!("V-{req_id}");
                let quantity = request["quantity"].as_u64().unwrap();
                let price = request["limit_price"].as_str().unwrap_or("150").to_string();
                send(&mut ws, &json!({
                    "type": "order_ack", "req_id": req_id, "order_id": order_id
                }))
                .await;
                send(&mut ws, &json!({
                    "type": "order_status", "order_id": order_id, "status": "FILLED",
                    "filled_quantity": quantity, "avg_fill_price": price
                }))
                .await;
            }
            "cancel_order" => {
                let order_id = request["order_id"].as_str().unwrap().to_string();
                let known = order_id.starts_with("V-");
                send(&mut ws, &json!({
                    "type": "cancel_ack", "req_id": req_id, "order_id": order_id, "known": known
                }))
                .await;
            }
            "positions" => match behavior {
                VenueBehavior::DropOnPositions => return,
                VenueBehavior::IgnorePositions => {}
                VenueBehavior::Normal => {
                    send(&mut ws, &json!({
                        "type": "position", "req_id": req_id, "symbol": "AAPL",
                        "quantity": 20, "avg_cost": "140", "last_price": "150",
                        "currency": "USD"
                    }))
                    .await;
                    send(&mut ws, &json!({ "type": "positions_end", "req_id": req_id })).await;
                }
            },
            "account" => {
                for (key, value) in [
                    ("cash_balance", "5000"),
                    ("buying_power", "10000"),
                    ("portfolio_value", "50000"),
                ] {
                    send(&mut ws, &json!({
                        "type": "account_value", "req_id": req_id,
                        "key": key, "value": value, "currency": "USD"
                    }))
                    .await;
                }
                send(&mut ws, &json!({
                    "type": "account_end", "req_id": req_id, "account_id": "DU123"
                }))
                .await;
            }
            "subscribe" => {
                let symbol = request["symbol"].as_str().unwrap().to_string();
                send(&mut ws, &json!({
                    "type": "tick", "req_id": req_id, "symbol": symbol, "price": "151.50"
                }))
                .await;
            }
            "historical_bars" => {
                for close in ["150", "151", "152"] {
                    send(&mut ws, &json!({
                        "type": "bar", "req_id": req_id,
                        "timestamp": "2026-08-21T14:30:00Z",
                        "open": "149", "high": "153", "low": "148",
                        "close": close, "volume": 1_000_000
                    }))
                    .await;
                }
                send(&mut ws, &json!({ "type": "bars_end", "req_id": req_id })).await;
            }
            _ => {}
        }
    }
}

async fn send(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    message: &Value,
) {
    let _ = ws.send(Message::Text(message.to_string().into())).await;
}

fn test_config(url: String) -> Config {
    let mut config = Config::default();
    config.venue.url = url;
    config.timeouts.connect_secs = 2;
    config.timeouts.request_secs = 2;
    config.timeouts.market_data_secs = 1;
    config.reconnect.base_delay_ms = 50;
    config.reconnect.cap_exponent = 2;
    config.reconnect.max_attempts = 3;
    config.circuit_breaker.cooldown_secs = 1;
    config
}

async fn connected_gateway(behavior: VenueBehavior) -> VenueGateway {
    let url = spawn_mock_venue(behavior).await;
    let gateway = VenueGateway::new(test_config(url), Arc::new(InMemoryTradeStore::new()));
    gateway.connect().await.unwrap();
    gateway
}

/// Prime the cache with account and positions the way a caller would.
async fn prime_state(gateway: &VenueGateway) {
    gateway.get_account().await.unwrap();
    gateway.get_positions().await.unwrap();
}

/// Poll the order cache until the order reaches a terminal status.
async fn wait_for_fill(gateway: &VenueGateway, order_id: &str) -> venue_gateway::models::Order {
    for _ in 0..100 {
        if let Some(order) = gateway.cache().order(order_id)
            && order.status.is_terminal()
        {
            return order;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("order {order_id} never reached a terminal status");
}

// ============================================
// Order lifecycle
// ============================================

#[tokio::test]
async fn limit_buy_is_validated_submitted_and_filled() {
    let gateway = connected_gateway(VenueBehavior::Normal).await;
    prime_state(&gateway).await;

    let ticket = OrderTicket::limit("AAPL", OrderSide::Buy, 10, "150".parse().unwrap());
    let outcome = gateway.place_order(ticket).await.unwrap();

    let order = match outcome {
        PlaceOrderOutcome::Accepted(order) => order,
        PlaceOrderOutcome::Rejected { reason } => panic!("unexpected rejection: {reason}"),
    };
    assert!(!order.order_id.is_empty());
    assert!(order.submitted_at.is_some());

    let filled = wait_for_fill(&gateway, &order.order_id).await;
    assert_eq!(filled.status, OrderStatus::Filled);
    assert_eq!(filled.filled_quantity, 10);

    let status = gateway.status();
    assert_eq!(status.orders_placed, 1);
    assert_eq!(status.orders_succeeded, 1);

    gateway.disconnect().await;
}

#[tokio::test]
async fn oversell_is_rejected_before_the_wire() {
    let gateway = connected_gateway(VenueBehavior::Normal).await;
    prime_state(&gateway).await;

    // holding 20 AAPL, selling 50
    let ticket = OrderTicket::market("AAPL", OrderSide::Sell, 50);
    let outcome = gateway.place_order(ticket).await.unwrap();

    match outcome {
        PlaceOrderOutcome::Rejected { reason } => {
            assert!(reason.contains("Insufficient shares"), "reason: {reason}");
        }
        PlaceOrderOutcome::Accepted(_) => panic!("oversell must be rejected"),
    }

    // nothing reached the venue
    assert_eq!(gateway.status().orders_placed, 0);

    gateway.disconnect().await;
}

// ============================================
// Disconnect and reconnect
// ============================================

#[tokio::test]
async fn mid_request_disconnect_fails_pending_and_counts_one_breaker_failure() {
    let gateway = connected_gateway(VenueBehavior::DropOnPositions).await;

    let result = gateway.get_positions().await;
    assert!(
        matches!(result, Err(GatewayError::ConnectionLost { .. })),
        "expected ConnectionLost, got {result:?}"
    );

    // the session's death is one breaker failure
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gateway.breaker_snapshot().total_failures, 1);
    assert_eq!(gateway.status().failures, 1);

    // the supervisor reconnects on the same mock
    for _ in 0..100 {
        if gateway.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(gateway.is_connected());
    assert!(gateway.status().reconnections >= 1);

    gateway.disconnect().await;
}

#[tokio::test]
async fn disconnect_releases_waiting_callers_with_cancelled() {
    let gateway = connected_gateway(VenueBehavior::IgnorePositions).await;

    let waiter = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.get_positions().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    gateway.disconnect().await;

    let result = waiter.await.unwrap();
    assert!(
        matches!(result, Err(GatewayError::Cancelled)),
        "expected Cancelled, got {result:?}"
    );
}

#[tokio::test]
async fn unanswered_request_times_out_and_leaves_no_waiter() {
    let gateway = connected_gateway(VenueBehavior::IgnorePositions).await;

    let result = gateway.get_positions().await;
    assert!(
        matches!(result, Err(GatewayError::Timeout { .. })),
        "expected Timeout, got {result:?}"
    );
    assert_eq!(gateway.status().pending_requests, 0);

    gateway.disconnect().await;
}

// ============================================
// Cancels, market data, history
// ============================================

#[tokio::test]
async fn cancel_of_unknown_order_returns_false() {
    let gateway = connected_gateway(VenueBehavior::Normal).await;

    let cancelled = gateway.cancel_order("X-404").await.unwrap();
    assert!(!cancelled);

    gateway.disconnect().await;
}

#[tokio::test]
async fn cancel_of_known_order_returns_true() {
    let gateway = connected_gateway(VenueBehavior::Normal).await;
    prime_state(&gateway).await;

    let ticket = OrderTicket::limit("AAPL", OrderSide::Buy, 5, "150".parse().unwrap());
    let PlaceOrderOutcome::Accepted(order) = gateway.place_order(ticket).await.unwrap() else {
        panic!("order should be accepted");
    };

    let cancelled = gateway.cancel_order(&order.order_id).await.unwrap();
    assert!(cancelled);

    gateway.disconnect().await;
}

#[tokio::test]
async fn market_price_returns_first_tick_and_caches_it() {
    let gateway = connected_gateway(VenueBehavior::Normal).await;

    let price = gateway.get_market_price("MSFT").await.unwrap();
    assert_eq!(price, "151.50".parse().unwrap());
    assert_eq!(gateway.cache().last_price("MSFT"), Some(price));

    gateway.disconnect().await;
}

#[tokio::test]
async fn historical_bars_aggregate_until_end_marker() {
    let gateway = connected_gateway(VenueBehavior::Normal).await;

    let bars = gateway.get_historical_bars("AAPL", "1d", 100).await.unwrap();
    assert_eq!(bars.len(), 3);
    assert_eq!(bars[2].close, "152".parse().unwrap());

    gateway.disconnect().await;
}

// ============================================
// Circuit breaker
// ============================================

#[tokio::test]
async fn repeated_failed_connects_open_the_circuit() {
    // nothing listens on this port
    let mut config = test_config("ws://127.0.0.1:1".to_string());
    config.circuit_breaker.failure_threshold = 3;
    let gateway = VenueGateway::new(config, Arc::new(InMemoryTradeStore::new()));

    for _ in 0..3 {
        let result = gateway.connect().await;
        assert!(matches!(result, Err(GatewayError::ConnectionLost { .. })));
    }

    // threshold reached: the next attempt is refused without dialing
    let result = gateway.connect().await;
    assert!(
        matches!(result, Err(GatewayError::CircuitOpen { .. })),
        "expected CircuitOpen, got {result:?}"
    );

    let snapshot = gateway.breaker_snapshot();
    assert_eq!(snapshot.consecutive_failures, 3);
    assert!(snapshot.remaining_cooldown_secs.is_some());
}

#[tokio::test]
async fn open_circuit_cooldown_does_not_consume_reconnect_attempts() {
    let url = spawn_mock_venue(VenueBehavior::DropOnPositions).await;
    let mut config = test_config(url);
    // one lost session opens the circuit, and the supervisor gets exactly
    // one reconnect attempt; it must not be spent on the cooldown wait
    config.circuit_breaker.failure_threshold = 1;
    config.circuit_breaker.cooldown_secs = 1;
    config.reconnect.max_attempts = 1;
    let gateway = VenueGateway::new(config, Arc::new(InMemoryTradeStore::new()));
    gateway.connect().await.unwrap();

    let result = gateway.get_positions().await;
    assert!(
        matches!(result, Err(GatewayError::ConnectionLost { .. })),
        "expected ConnectionLost, got {result:?}"
    );

    // the single attempt waits out the cooldown and then connects
    for _ in 0..200 {
        if gateway.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(gateway.is_connected());
    assert_eq!(gateway.status().reconnections, 1);

    gateway.disconnect().await;
}

#[tokio::test]
async fn half_open_trial_reconnects_after_cooldown() {
    let mut config = test_config("ws://127.0.0.1:1".to_string());
    config.circuit_breaker.cooldown_secs = 1;
    let gateway = VenueGateway::new(config, Arc::new(InMemoryTradeStore::new()));

    for _ in 0..3 {
        let _ = gateway.connect().await;
    }
    assert!(matches!(
        gateway.connect().await,
        Err(GatewayError::CircuitOpen { .. })
    ));

    // after the cooldown a trial attempt is allowed again (and fails,
    // reopening the circuit)
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let result = gateway.connect().await;
    assert!(matches!(result, Err(GatewayError::ConnectionLost { .. })));
    assert!(matches!(
        gateway.connect().await,
        Err(GatewayError::CircuitOpen { .. })
    ));
}
