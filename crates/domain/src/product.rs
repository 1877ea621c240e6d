//! Catalog product as seen by the checkout flow.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Product snapshot: current price and stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Current unit price.
    pub price: Money,
    /// Units on hand. Never negative.
    pub stock: u32,
    pub category: String,
}

impl Product {
    /// Creates a product with a fresh identifier.
    pub fn new(
        name: impl Into<String>,
        price: Money,
        stock: u32,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock,
            category: category.into(),
        }
    }

    /// Returns true if `quantity` units can be taken from stock.
    pub fn has_stock_for(&self, quantity: u64) -> bool {
        u64::from(self.stock) >= quantity
    }
}
