//! Per-user account state relevant to checkout.

use common::UserId;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A user's account: the cart lock and the cached cart total.
///
/// ```text
/// Unlocked ──(checkout initiated)──► Locked
///    ▲                                  │
///    └──(settled, cancelled, failed)────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    /// True while a checkout is in flight.
    pub cart_locked: bool,
    /// Denormalized sum of `quantity × fee` over the user's cart lines.
    pub cart_total: Money,
}

impl Account {
    /// Creates an unlocked account with an empty cart total.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            cart_locked: false,
            cart_total: Money::zero(),
        }
    }

    /// Returns true if cart mutation and checkout are blocked.
    pub fn is_locked(&self) -> bool {
        self.cart_locked
    }

    /// Releases the lock, keeping the cached total (cart left untouched).
    pub fn unlock(&mut self) {
        self.cart_locked = false;
    }

    /// Releases the lock after the cart was converted into an order.
    pub fn release_after_fulfillment(&mut self) {
        self.cart_locked = false;
        self.cart_total = Money::zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_is_unlocked_and_empty() {
        let account = Account::new("alice");
        assert!(!account.is_locked());
        assert!(account.cart_total.is_zero());
    }

    #[test]
    fn unlock_keeps_total_but_release_zeroes_it() {
        let mut account = Account::new("bob");
        account.cart_locked = true;
        account.cart_total = Money::from_cents(2500);

        account.unlock();
        assert!(!account.is_locked());
        assert_eq!(account.cart_total, Money::from_cents(2500));

        account.cart_locked = true;
        account.release_after_fulfillment();
        assert!(!account.is_locked());
        assert!(account.cart_total.is_zero());
    }
}
