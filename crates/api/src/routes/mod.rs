//! HTTP handlers grouped by resource.

pub mod cart;
pub mod orders;
pub mod payments;
pub mod system;

use std::str::FromStr;
use std::sync::Arc;

use checkout::{CartService, CheckoutCoordinator, Pagination, PaymentGateway};
use serde::Deserialize;
use store::Store;

use crate::error::ApiError;

pub type SharedStore = Arc<dyn Store>;
pub type SharedGateway = Arc<dyn PaymentGateway>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub carts: CartService<SharedStore>,
    pub checkout: CheckoutCoordinator<SharedStore, SharedGateway>,
    /// Storage backend name reported by `/health`.
    pub backend: &'static str,
}

impl AppState {
    pub fn new(store: SharedStore, gateway: SharedGateway, backend: &'static str) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            checkout: CheckoutCoordinator::new(store, gateway),
            backend,
        }
    }
}

/// `?page=&limit=` query. Values that do not parse are treated as absent.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(
            self.page.as_deref().and_then(|p| p.trim().parse().ok()),
            self.limit.as_deref().and_then(|l| l.trim().parse().ok()),
        )
    }
}

/// Parses a UUID path or body value into a typed identifier.
pub(crate) fn parse_id<T>(raw: &str, field: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
