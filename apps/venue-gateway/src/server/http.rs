//! axum routes delegating to the gateway facade.
//!
//! Each handler forwards to one facade call and maps the error taxonomy
//! to HTTP statuses (connectivity 503, deadline 504, venue rejection 502,
//! missing data 404).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{GatewayError, HttpErrorResponse};
use crate::gateway::{PlaceOrderOutcome, VenueGateway};
use crate::models::OrderTicket;

type ApiError = (StatusCode, Json<HttpErrorResponse>);

fn map_error(err: &GatewayError) -> ApiError {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.to_http_response()))
}

/// Build the gateway's HTTP router.
#[must_use]
pub fn build_router(gateway: VenueGateway) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/positions", get(positions))
        .route("/account", get(account))
        .route("/price/{symbol}", get(market_price))
        .route("/bars/{symbol}", get(historical_bars))
        .route("/orders", post(place_order))
        .route("/orders/{order_id}", delete(cancel_order))
        .with_state(gateway)
}

/// Serve the router until the shutdown token fires.
pub async fn serve(
    gateway: VenueGateway,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let router = build_router(gateway);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "http facade listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn status(State(gateway): State<VenueGateway>) -> Json<crate::gateway::GatewayStatus> {
    Json(gateway.status())
}

async fn connect(State(gateway): State<VenueGateway>) -> Result<StatusCode, ApiError> {
    gateway.connect().await.map_err(|e| map_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn disconnect(State(gateway): State<VenueGateway>) -> StatusCode {
    gateway.disconnect().await;
    StatusCode::NO_CONTENT
}

async fn positions(
    State(gateway): State<VenueGateway>,
) -> Result<Json<Vec<crate::models::Position>>, ApiError> {
    let positions = gateway.get_positions().await.map_err(|e| map_error(&e))?;
    Ok(Json(positions))
}

async fn account(
    State(gateway): State<VenueGateway>,
) -> Result<Json<crate::models::AccountSummary>, ApiError> {
    let account = gateway.get_account().await.map_err(|e| map_error(&e))?;
    Ok(Json(account))
}

#[derive(Debug, Serialize)]
struct PriceResponse {
    symbol: String,
    price: rust_decimal::Decimal,
}

async fn market_price(
    State(gateway): State<VenueGateway>,
    Path(symbol): Path<String>,
) -> Result<Json<PriceResponse>, ApiError> {
    let price = gateway
        .get_market_price(&symbol)
        .await
        .map_err(|e| map_error(&e))?;
    Ok(Json(PriceResponse { symbol, price }))
}

#[derive(Debug, Deserialize)]
struct BarsQuery {
    #[serde(default = "default_bar_size")]
    bar_size: String,
    #[serde(default = "default_bar_limit")]
    limit: u32,
}

fn default_bar_size() -> String {
    "1d".to_string()
}

const fn default_bar_limit() -> u32 {
    100
}

async fn historical_bars(
    State(gateway): State<VenueGateway>,
    Path(symbol): Path<String>,
    Query(query): Query<BarsQuery>,
) -> Result<Json<Vec<crate::models::Bar>>, ApiError> {
    let bars = gateway
        .get_historical_bars(&symbol, &query.bar_size, query.limit)
        .await
        .map_err(|e| map_error(&e))?;
    Ok(Json(bars))
}

async fn place_order(
    State(gateway): State<VenueGateway>,
    Json(ticket): Json<OrderTicket>,
) -> Result<(StatusCode, Json<PlaceOrderOutcome>), ApiError> {
    let outcome = gateway.place_order(ticket).await.map_err(|e| map_error(&e))?;
    let status = match &outcome {
        PlaceOrderOutcome::Accepted(_) => StatusCode::CREATED,
        PlaceOrderOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((status, Json(outcome)))
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    order_id: String,
    cancelled: bool,
}

async fn cancel_order(
    State(gateway): State<VenueGateway>,
    Path(order_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = gateway
        .cancel_order(&order_id)
        .await
        .map_err(|e| map_error(&e))?;
    Ok(Json(CancelResponse { order_id, cancelled }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::persistence::InMemoryTradeStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> Router {
        let gateway =
            VenueGateway::new(Config::default(), Arc::new(InMemoryTradeStore::new()));
        build_router(gateway)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_is_json() {
        let response = router()
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn positions_without_connection_is_503() {
        let response = router()
            .oneshot(Request::get("/positions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn invalid_order_is_422_not_an_error() {
        let body = serde_json::json!({
            "symbol": "AAPL",
            "side": "SELL",
            "order_type": "MARKET",
            "quantity": 50
        });
        let response = router()
            .oneshot(
                Request::post("/orders")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
