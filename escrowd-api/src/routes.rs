//! HTTP routes for the escrow API
//!
//! The transport exposes the engine's five operations without altering
//! their contracts, plus the BIP70 payment request/payment endpoints, a
//! health check, and an index route.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use escrowd_engine::bip70::{self, Payment, PaymentAck};
use escrowd_engine::error::EscrowError;
use escrowd_engine::service::{
    CreateEscrowRequest, EscrowService, SignatureRequest, VerifyPaymentRequest,
};

use crate::error::ApiError;

/// Testnet address served by the demo payment-request endpoint
const DEMO_ADDRESS: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
const DEMO_AMOUNT_SATS: i64 = 100_000;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EscrowService>,
    pub public_base_url: String,
}

/// Build the application router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/escrow/create", post(create_escrow))
        .route("/api/escrow/release", post(release_escrow))
        .route("/api/escrow/refund", post(refund_escrow))
        .route("/api/escrow/verify-payment", post(verify_payment))
        .route("/api/escrow/get", get(get_escrow))
        .route("/api/pay/request/:request_id", get(payment_request))
        .route("/api/pay/:request_id", post(submit_payment))
        .route("/health", get(health))
        .route("/", get(index))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn create_escrow(
    State(state): State<AppState>,
    Json(request): Json<CreateEscrowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.service.create_escrow(request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn release_escrow(
    State(state): State<AppState>,
    Json(request): Json<SignatureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.service.submit_release_signature(request).await?;
    Ok(Json(receipt))
}

async fn refund_escrow(
    State(state): State<AppState>,
    Json(request): Json<SignatureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.service.submit_refund_signature(request).await?;
    Ok(Json(receipt))
}

async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.service.verify_payment(request).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct GetEscrowParams {
    id: Uuid,
}

async fn get_escrow(
    State(state): State<AppState>,
    Query(params): Query<GetEscrowParams>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.service.get_escrow(params.id).await?;
    Ok(Json(record))
}

async fn payment_request(
    State(state): State<AppState>,
    Path(_request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // A deployment with stored requests would look the id up; the demo
    // always serves a fresh request for the example address.
    let request =
        bip70::build_payment_request(DEMO_ADDRESS, DEMO_AMOUNT_SATS, &state.public_base_url)?;
    let body = serde_json::to_vec(&request).map_err(EscrowError::from)?;

    Ok((
        [(header::CONTENT_TYPE, bip70::PAYMENT_REQUEST_CONTENT_TYPE)],
        body,
    ))
}

async fn submit_payment(
    Path(_request_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type != bip70::PAYMENT_CONTENT_TYPE {
        return Err(ApiError::UnsupportedMediaType(bip70::PAYMENT_CONTENT_TYPE));
    }

    let payment: Payment = serde_json::from_slice(&body).map_err(EscrowError::from)?;
    if payment.transactions.is_empty() {
        return Err(EscrowError::validation("Payment contains no transactions").into());
    }

    let ack = PaymentAck {
        payment,
        memo: "Thank you for your payment".to_string(),
    };
    let body = serde_json::to_vec(&ack).map_err(EscrowError::from)?;

    Ok((
        [(header::CONTENT_TYPE, bip70::PAYMENT_ACK_CONTENT_TYPE)],
        body,
    ))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "escrows": state.service.escrow_count().await,
    }))
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "name": "escrowd",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "A Bitcoin escrow service using BIP70 and 2-of-3 multisig",
        "endpoints": [
            "/api/escrow/create",
            "/api/escrow/release",
            "/api/escrow/refund",
            "/api/escrow/verify-payment",
            "/api/escrow/get",
            "/api/pay/request/{request_id}",
            "/api/pay/{request_id}",
            "/health",
        ],
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not_found",
            "code": 404,
            "message": "Endpoint not found",
        })),
    )
}
