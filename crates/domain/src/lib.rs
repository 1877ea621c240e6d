//! Domain layer for the shop backend.
//!
//! This crate holds the plain data model and the rules that can be
//! evaluated without storage:
//! - `Money` arithmetic in integer cents
//! - cart merge rules (`merge_line`) and cart totals
//! - the payment status machine
//! - order construction from a cart snapshot

pub mod account;
pub mod cart;
pub mod error;
pub mod money;
pub mod order;
pub mod payment;
pub mod product;

pub use account::Account;
pub use cart::{Cart, CartChange, CartLine, merge_line, total_of};
pub use common::{OrderId, PaymentId, ProductId, UserId};
pub use error::DomainError;
pub use money::Money;
pub use order::{NewOrder, Order, OrderLine, OrderStatus};
pub use payment::{GatewayOutcome, NewPayment, Payment, PaymentMethod, PaymentStatus};
pub use product::Product;
