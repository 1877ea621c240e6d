//! Domain error types.

use common::ProductId;
use thiserror::Error;

use crate::payment::PaymentStatus;

/// Errors raised by domain rules before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A cart mutation carried a zero delta.
    #[error("Invalid quantity: {delta} (must be non-zero)")]
    InvalidQuantity { delta: i32 },

    /// Requested quantity exceeds the product's stock.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: u32,
    },

    /// A line or cart total does not fit in `i64` cents.
    #[error("Amount overflow: {context}")]
    AmountOverflow { context: &'static str },

    /// The payment is not in a state that allows the action.
    #[error("Invalid payment transition: cannot {action} from {current} state")]
    InvalidPaymentTransition {
        current: PaymentStatus,
        action: &'static str,
    },

    /// Payment method identifier is blank.
    #[error("Payment method is required")]
    PaymentMethodRequired,
}
