//! Checkout and payment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use checkout::Settlement;
use chrono::{DateTime, Utc};
use common::{PaymentId, UserId};
use domain::{GatewayOutcome, Payment};
use serde::{Deserialize, Serialize};

use super::{AppState, PageQuery, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: String,
}

/// Gateway callback body.
#[derive(Deserialize)]
pub struct SettleRequest {
    pub success: bool,
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub user_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub payment_method: String,
    pub gateway_transaction_id: Option<String>,
    pub gateway_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            user_id: payment.user_id.to_string(),
            amount_cents: payment.amount.cents(),
            status: payment.status.to_string(),
            payment_method: payment.method.to_string(),
            gateway_transaction_id: payment.gateway_transaction_id,
            gateway_response: payment.gateway_response,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct SettlementResponse {
    pub payment: PaymentResponse,
    pub order_id: Option<String>,
}

impl From<Settlement> for SettlementResponse {
    fn from(settlement: Settlement) -> Self {
        Self {
            payment: settlement.payment.into(),
            order_id: settlement.order_id.map(|id| id.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct PaymentListResponse {
    pub page: u32,
    pub limit: u32,
    pub payments: Vec<PaymentResponse>,
}

// -- Handlers --

/// POST /users/{user_id}/checkout: locks the cart and opens a pending payment.
#[tracing::instrument(skip(state, req))]
pub async fn initiate(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    let payment = state
        .checkout
        .initiate_checkout(user_id, &req.payment_method)
        .await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// POST /users/{user_id}/checkout/complete: initiate, charge and settle.
#[tracing::instrument(skip(state, req))]
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    let settlement = state
        .checkout
        .checkout(user_id, &req.payment_method)
        .await?;
    Ok(Json(settlement.into()))
}

/// GET /users/{user_id}/payments?page=&limit=
#[tracing::instrument(skip(state))]
pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaymentListResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    let page = query.pagination();
    let payments = state.checkout.list_payments(user_id, page).await?;

    Ok(Json(PaymentListResponse {
        page: page.page,
        limit: page.limit,
        payments: payments.into_iter().map(Into::into).collect(),
    }))
}

/// GET /payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment id")?;
    let payment = state.checkout.get_payment(payment_id).await?;
    Ok(Json(payment.into()))
}

/// POST /payments/{id}/settle: applies an externally reported gateway outcome.
#[tracing::instrument(skip(state, req))]
pub async fn settle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SettleRequest>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment id")?;
    let outcome = GatewayOutcome {
        success: req.success,
        transaction_id: req.transaction_id.filter(|t| !t.trim().is_empty()),
        message: req.message,
    };
    let settlement = state.checkout.settle_payment(payment_id, outcome).await?;
    Ok(Json(settlement.into()))
}

/// POST /payments/{id}/process: charges the configured gateway.
#[tracing::instrument(skip(state))]
pub async fn process(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment id")?;
    let settlement = state.checkout.process_payment(payment_id).await?;
    Ok(Json(settlement.into()))
}

/// POST /payments/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment id")?;
    let payment = state.checkout.cancel_payment(payment_id).await?;
    Ok(Json(payment.into()))
}

/// POST /payments/{id}/resume: retries fulfillment of a completed payment.
#[tracing::instrument(skip(state))]
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let payment_id: PaymentId = parse_id(&id, "payment id")?;
    let settlement = state.checkout.resume_fulfillment(payment_id).await?;
    Ok(Json(settlement.into()))
}
