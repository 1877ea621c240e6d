//! Shared types for the shop backend.

pub mod ids;

pub use ids::{OrderId, PaymentId, ProductId, UserId};
