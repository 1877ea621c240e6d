//! Order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::Order;
use serde::Serialize;

use super::{AppState, PageQuery, parse_id};
use crate::error::ApiError;

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub payment_id: Option<String>,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub price_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            payment_id: order.payment_id.map(|id| id.to_string()),
            status: order.status.to_string(),
            items: order
                .lines
                .iter()
                .map(|line| OrderItemResponse {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                    price_cents: line.unit_price.cents(),
                })
                .collect(),
            total_cents: order.total.cents(),
            created_at: order.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub page: u32,
    pub limit: u32,
    pub orders: Vec<OrderResponse>,
}

/// GET /users/{user_id}/orders?page=&limit=
#[tracing::instrument(skip(state))]
pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id, "user_id")?;
    let page = query.pagination();
    let orders = state.checkout.list_orders(user_id, page).await?;

    Ok(Json(OrderListResponse {
        page: page.page,
        limit: page.limit,
        orders: orders.into_iter().map(Into::into).collect(),
    }))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state.checkout.get_order(order_id).await?;
    Ok(Json(order.into()))
}
