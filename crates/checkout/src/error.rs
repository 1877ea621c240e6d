//! Checkout error types.

use common::{OrderId, PaymentId, ProductId, UserId};
use domain::{DomainError, PaymentStatus};
use store::StoreError;
use thiserror::Error;

/// Broad category of a [`CheckoutError`], used by callers to pick a
/// response without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Capacity,
    Upstream,
}

/// Errors that can occur during cart and checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Account not found: {0}")]
    AccountNotFound(UserId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Cart mutation attempted while a checkout is in flight.
    #[error("Cart is locked for user {0}")]
    CartLocked(UserId),

    /// A checkout is already in flight for the user.
    #[error("Cart is already locked for user {0}")]
    CartAlreadyLocked(UserId),

    #[error("Payment {payment_id} is not pending (status: {status})")]
    PaymentNotPending {
        payment_id: PaymentId,
        status: PaymentStatus,
    },

    #[error("Payment {0} is already being charged")]
    PaymentInProgress(PaymentId),

    #[error("Cart is empty for user {0}")]
    EmptyCart(UserId),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Payment method is required")]
    InvalidPaymentMethod,

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: u32,
    },

    /// A line or cart total does not fit in the money representation.
    #[error("Amount too large: {0}")]
    AmountOverflow(&'static str),

    /// The payment gateway could not be reached or returned garbage.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    /// Payment completed but the order could not be written. The account
    /// stays locked until fulfillment is resumed.
    #[error("Fulfillment failed for payment {payment_id}: {reason}")]
    FulfillmentFailed {
        payment_id: PaymentId,
        reason: String,
    },

    #[error("Fulfillment cannot be resumed for payment {payment_id}: {reason}")]
    NotResumable {
        payment_id: PaymentId,
        reason: String,
    },

    /// A domain rule rejected the operation.
    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::AccountNotFound(_)
            | CheckoutError::ProductNotFound(_)
            | CheckoutError::PaymentNotFound(_)
            | CheckoutError::OrderNotFound(_) => ErrorKind::NotFound,
            CheckoutError::CartLocked(_)
            | CheckoutError::CartAlreadyLocked(_)
            | CheckoutError::PaymentNotPending { .. }
            | CheckoutError::PaymentInProgress(_)
            | CheckoutError::NotResumable { .. }
            | CheckoutError::Domain(_) => ErrorKind::Conflict,
            CheckoutError::EmptyCart(_)
            | CheckoutError::InvalidQuantity(_)
            | CheckoutError::InvalidPaymentMethod => ErrorKind::Validation,
            CheckoutError::InsufficientStock { .. } | CheckoutError::AmountOverflow(_) => {
                ErrorKind::Capacity
            }
            CheckoutError::Gateway(_)
            | CheckoutError::Store(_)
            | CheckoutError::FulfillmentFailed { .. } => ErrorKind::Upstream,
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidQuantity { delta } => CheckoutError::InvalidQuantity(delta),
            DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            DomainError::PaymentMethodRequired => CheckoutError::InvalidPaymentMethod,
            DomainError::AmountOverflow { context } => CheckoutError::AmountOverflow(context),
            other => CheckoutError::Domain(other),
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                product_id,
                requested: u64::from(requested),
                available,
            },
            other => CheckoutError::Store(other),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_stock_error_maps_to_capacity() {
        let err: CheckoutError = StoreError::InsufficientStock {
            product_id: ProductId::new(),
            requested: 3,
            available: 1,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Capacity);
    }

    #[test]
    fn test_other_store_errors_are_upstream() {
        let err: CheckoutError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_domain_errors_map_to_validation() {
        let err: CheckoutError = DomainError::InvalidQuantity { delta: 0 }.into();
        assert!(matches!(err, CheckoutError::InvalidQuantity(0)));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: CheckoutError = DomainError::PaymentMethodRequired.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_amount_overflow_maps_to_capacity() {
        let err: CheckoutError = DomainError::AmountOverflow {
            context: "cart total",
        }
        .into();
        assert!(matches!(err, CheckoutError::AmountOverflow("cart total")));
        assert_eq!(err.kind(), ErrorKind::Capacity);
    }

    #[test]
    fn test_payment_not_pending_is_conflict() {
        let err = CheckoutError::PaymentNotPending {
            payment_id: PaymentId::new(),
            status: PaymentStatus::Completed,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("completed"));
    }
}
