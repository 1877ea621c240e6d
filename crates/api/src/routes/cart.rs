//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use checkout::{CartItemDelta, CartView, CheckoutError};
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct UpdateCartRequest {
    pub items: Vec<CartItemRequest>,
}

#[derive(Deserialize)]
pub struct CartItemRequest {
    pub product_id: String,
    /// Units to add; negative removes.
    pub quantity: i32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub user_id: String,
    pub locked: bool,
    pub items: Vec<CartItemResponse>,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub fee_cents: i64,
    pub line_total_cents: i64,
}

impl TryFrom<CartView> for CartResponse {
    type Error = ApiError;

    fn try_from(view: CartView) -> Result<Self, Self::Error> {
        let items = view
            .lines
            .iter()
            .map(|line| {
                Ok(CartItemResponse {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                    fee_cents: line.fee.cents(),
                    line_total_cents: line.line_total().map_err(CheckoutError::from)?.cents(),
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        Ok(Self {
            user_id: view.user_id.to_string(),
            locked: view.locked,
            items,
            total_cents: view.total.cents(),
        })
    }
}

// -- Handlers --

/// GET /users/{user_id}/cart
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    let view = state.carts.get_cart(user_id).await?;
    Ok(Json(view.try_into()?))
}

/// POST /users/{user_id}/cart: applies every item delta or none of them.
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateCartRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    if req.items.is_empty() {
        return Err(ApiError::BadRequest("items must not be empty".to_string()));
    }

    let items = req
        .items
        .iter()
        .map(|item| {
            Ok(CartItemDelta {
                product_id: parse_id::<ProductId>(&item.product_id, "product_id")?,
                quantity: item.quantity,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let view = state.carts.apply_batch(user_id, &items).await?;
    Ok(Json(view.try_into()?))
}

/// DELETE /users/{user_id}/cart
#[tracing::instrument(skip(state))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    let view = state.carts.clear(user_id).await?;
    Ok(Json(view.try_into()?))
}
