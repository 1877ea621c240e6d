//! Cart management and checkout orchestration.
//!
//! A checkout moves through these steps:
//! 1. Lock the user's cart and record its total
//! 2. Create a pending payment
//! 3. Charge the payment gateway and settle the payment
//! 4. On success, turn the cart into an order in one unit of work
//!
//! A failed payment write in step 2 releases the lock again. A failed
//! step 4 leaves the cart locked for [`CheckoutCoordinator::resume_fulfillment`].

pub mod cart;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod pagination;

pub use cart::{CartItemDelta, CartService, CartView};
pub use coordinator::{CheckoutCoordinator, Settlement};
pub use error::{CheckoutError, ErrorKind, Result};
pub use gateway::{InMemoryGateway, PaymentGateway, SimulatedGateway};
pub use pagination::Pagination;
