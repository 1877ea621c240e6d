//! Cart lines and the merge rules applied by add/remove requests.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;
use crate::product::Product;

/// One (user, product) row in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    /// Always positive once persisted.
    pub quantity: u32,
    /// Unit price captured when the line was last merged.
    pub fee: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// Returns `quantity × fee`.
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.fee
            .checked_mul(self.quantity)
            .ok_or(DomainError::AmountOverflow {
                context: "cart line total",
            })
    }
}

/// The persisted effect of merging a delta into a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartChange {
    /// No line existed; a new one must be stored.
    Insert(CartLine),
    /// An existing line changed quantity and fee.
    Update(CartLine),
    /// The merged quantity dropped to zero or below.
    Remove(ProductId),
    /// Removal requested for a product that is not in the cart.
    Unchanged,
}

/// Merges `delta` units of `product` into the user's existing line.
///
/// Quantities add up across calls; a result of zero or less removes the
/// line. A surviving line takes the product's current price as its fee.
/// Stock is only checked when the delta adds units, against the merged
/// quantity rather than the delta alone.
pub fn merge_line(
    user_id: UserId,
    existing: Option<&CartLine>,
    product: &Product,
    delta: i32,
    now: DateTime<Utc>,
) -> Result<CartChange, DomainError> {
    if delta == 0 {
        return Err(DomainError::InvalidQuantity { delta });
    }

    let current = existing.map_or(0, |line| i64::from(line.quantity));
    let merged = current + i64::from(delta);

    if merged <= 0 {
        return Ok(match existing {
            Some(line) => CartChange::Remove(line.product_id),
            None => CartChange::Unchanged,
        });
    }

    // merged is in 1..=2 * u32::MAX here
    let requested = merged as u64;
    if delta > 0 && !product.has_stock_for(requested) {
        return Err(DomainError::InsufficientStock {
            product_id: product.id,
            requested,
            available: product.stock,
        });
    }
    let quantity = u32::try_from(requested).map_err(|_| DomainError::InsufficientStock {
        product_id: product.id,
        requested,
        available: product.stock,
    })?;
    if product.price.checked_mul(quantity).is_none() {
        return Err(DomainError::AmountOverflow {
            context: "cart line total",
        });
    }

    Ok(match existing {
        Some(line) => CartChange::Update(CartLine {
            quantity,
            fee: product.price,
            updated_at: now,
            ..line.clone()
        }),
        None => CartChange::Insert(CartLine {
            user_id,
            product_id: product.id,
            quantity,
            fee: product.price,
            created_at: now,
            updated_at: now,
        }),
    })
}

/// Sums `quantity × fee` over `lines`, failing if any step overflows.
pub fn total_of(lines: &[CartLine]) -> Result<Money, DomainError> {
    lines.iter().try_fold(Money::zero(), |acc, line| {
        acc.checked_add(line.line_total()?)
            .ok_or(DomainError::AmountOverflow {
                context: "cart total",
            })
    })
}

/// A user's cart as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of all line totals.
    pub fn total(&self) -> Result<Money, DomainError> {
        total_of(&self.lines)
    }

    /// Applies a merge result to the in-memory line set.
    pub fn apply(&mut self, change: &CartChange) {
        match change {
            CartChange::Insert(line) => self.lines.push(line.clone()),
            CartChange::Update(line) => {
                if let Some(slot) = self
                    .lines
                    .iter_mut()
                    .find(|l| l.product_id == line.product_id)
                {
                    *slot = line.clone();
                }
            }
            CartChange::Remove(product_id) => self.lines.retain(|l| l.product_id != *product_id),
            CartChange::Unchanged => {}
        }
    }

    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }
}
