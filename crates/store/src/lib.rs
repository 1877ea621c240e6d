//! Storage layer for the shop backend.
//!
//! Every read and write goes through a [`UnitOfWork`] obtained from a
//! [`Store`]. A unit of work applies nothing until it is committed, and
//! concurrent units of work touching the same account are serialized.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{
    AccountRepository, CartRepository, InventoryRepository, OrderRepository, PaymentRepository,
    Store, UnitOfWork,
};
