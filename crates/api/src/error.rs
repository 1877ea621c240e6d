//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, ErrorKind};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Cart or checkout operation error.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match err.kind() {
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        ErrorKind::Conflict => (StatusCode::CONFLICT, err.to_string()),
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, err.to_string()),
        ErrorKind::Capacity => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        ErrorKind::Upstream => {
            tracing::error!(error = %err, "upstream failure");
            match err {
                CheckoutError::Gateway(_) => (
                    StatusCode::BAD_GATEWAY,
                    "payment gateway unavailable".to_string(),
                ),
                CheckoutError::FulfillmentFailed { payment_id, .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("payment {payment_id} completed but the order could not be created"),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                ),
            }
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{PaymentId, UserId};
    use domain::PaymentStatus;
    use store::StoreError;

    use super::*;

    fn status_of(err: CheckoutError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_kinds_map_to_status_codes() {
        assert_eq!(
            status_of(CheckoutError::AccountNotFound(UserId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CheckoutError::CartAlreadyLocked(UserId::new())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CheckoutError::PaymentNotPending {
                payment_id: PaymentId::new(),
                status: PaymentStatus::Failed,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CheckoutError::EmptyCart(UserId::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CheckoutError::InsufficientStock {
                product_id: common::ProductId::new(),
                requested: 2,
                available: 1,
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(CheckoutError::Gateway("timeout".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(CheckoutError::Store(StoreError::Unavailable(
                "down".to_string()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bad_request() {
        let response = ApiError::BadRequest("nope".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
