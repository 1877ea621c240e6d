//! Cart mutations and reads.

use chrono::Utc;
use common::{ProductId, UserId};
use domain::{Account, Cart, CartChange, CartLine, Money, merge_line};
use serde::{Deserialize, Serialize};
use store::{AccountRepository, CartRepository, InventoryRepository, Store, UnitOfWork};

use crate::error::{CheckoutError, Result};

/// One requested quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemDelta {
    pub product_id: ProductId,
    /// Units to add; negative removes.
    pub quantity: i32,
}

/// A user's cart with the cached total from the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub user_id: UserId,
    pub locked: bool,
    pub lines: Vec<CartLine>,
    pub total: Money,
}

impl CartView {
    fn new(account: &Account, lines: Vec<CartLine>) -> Self {
        Self {
            user_id: account.id,
            locked: account.cart_locked,
            lines,
            total: account.cart_total,
        }
    }
}

/// Service for reading and mutating carts.
///
/// Every mutation runs in one unit of work that also rewrites the
/// account's cached cart total.
#[derive(Clone)]
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Merges `delta` units of a product into the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn add_or_merge(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: i32,
    ) -> Result<CartView> {
        self.apply_batch(
            user_id,
            &[CartItemDelta {
                product_id,
                quantity: delta,
            }],
        )
        .await
    }

    /// Applies several deltas in order. Either all of them are stored or
    /// none are.
    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn apply_batch(&self, user_id: UserId, items: &[CartItemDelta]) -> Result<CartView> {
        let mut uow = self.store.begin().await?;

        let mut account = load_unlocked_account(uow.as_mut(), user_id).await?;
        let mut cart = Cart::new(uow.get_cart_lines(user_id).await?);
        let now = Utc::now();

        for item in items {
            let product = uow
                .get_product(item.product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound(item.product_id))?;

            let change = merge_line(
                user_id,
                cart.line(item.product_id),
                &product,
                item.quantity,
                now,
            )?;

            match &change {
                CartChange::Insert(line) | CartChange::Update(line) => {
                    uow.upsert_cart_line(line).await?
                }
                CartChange::Remove(product_id) => {
                    uow.delete_cart_line(user_id, *product_id).await?
                }
                CartChange::Unchanged => {}
            }
            cart.apply(&change);
        }

        account.cart_total = cart.total()?;
        uow.update_account(&account).await?;
        uow.commit().await?;

        metrics::counter!("cart_mutations_total").increment(items.len() as u64);
        tracing::debug!(%user_id, total = %account.cart_total, "cart updated");

        Ok(CartView::new(&account, cart.lines))
    }

    /// Returns the user's cart lines and cached total.
    pub async fn get_cart(&self, user_id: UserId) -> Result<CartView> {
        let mut uow = self.store.begin().await?;

        let account = uow
            .get_account(user_id)
            .await?
            .ok_or(CheckoutError::AccountNotFound(user_id))?;
        let lines = uow.get_cart_lines(user_id).await?;

        Ok(CartView::new(&account, lines))
    }

    /// Removes every line and zeroes the cached total. Clearing an empty
    /// cart succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<CartView> {
        let mut uow = self.store.begin().await?;

        let mut account = load_unlocked_account(uow.as_mut(), user_id).await?;
        let removed = uow.clear_cart(user_id).await?;
        account.cart_total = Money::zero();
        uow.update_account(&account).await?;
        uow.commit().await?;

        metrics::counter!("cart_mutations_total").increment(1);
        tracing::debug!(%user_id, removed, "cart cleared");

        Ok(CartView::new(&account, Vec::new()))
    }
}

async fn load_unlocked_account(uow: &mut dyn UnitOfWork, user_id: UserId) -> Result<Account> {
    let account = uow
        .get_account(user_id)
        .await?
        .ok_or(CheckoutError::AccountNotFound(user_id))?;

    if account.is_locked() {
        return Err(CheckoutError::CartLocked(user_id));
    }
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Product;
    use store::InMemoryStore;

    async fn setup(stock: u32) -> (InMemoryStore, CartService<InMemoryStore>, Account, Product) {
        let store = InMemoryStore::new();
        let account = Account::new("alice");
        let product = Product::new("Widget", Money::from_cents(1000), stock, "tools");

        let mut uow = store.begin().await.unwrap();
        uow.insert_account(&account).await.unwrap();
        uow.insert_product(&product).await.unwrap();
        uow.commit().await.unwrap();

        let service = CartService::new(store.clone());
        (store, service, account, product)
    }

    #[tokio::test]
    async fn test_deltas_accumulate() {
        let (store, service, account, product) = setup(10).await;

        service.add_or_merge(account.id, product.id, 3).await.unwrap();
        let view = service.add_or_merge(account.id, product.id, 2).await.unwrap();

        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.lines[0].quantity, 5);
        assert_eq!(view.total, Money::from_cents(5000));
        assert_eq!(
            store.account(account.id).await.unwrap().cart_total,
            Money::from_cents(5000)
        );
    }

    #[tokio::test]
    async fn test_line_removed_when_sum_drops_to_zero() {
        let (store, service, account, product) = setup(10).await;

        service.add_or_merge(account.id, product.id, 2).await.unwrap();
        let view = service.add_or_merge(account.id, product.id, -2).await.unwrap();

        assert!(view.lines.is_empty());
        assert!(view.total.is_zero());
        assert!(store.cart_lines(account.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_negative_delta_without_line_is_noop() {
        let (store, service, account, product) = setup(10).await;

        let view = service.add_or_merge(account.id, product.id, -1).await.unwrap();
        assert!(view.lines.is_empty());
        assert!(store.cart_lines(account.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_delta_rejected() {
        let (_, service, account, product) = setup(10).await;

        let err = service.add_or_merge(account.id, product.id, 0).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidQuantity(0)));
    }

    #[tokio::test]
    async fn test_merged_quantity_checked_against_stock() {
        let (store, service, account, product) = setup(3).await;

        service.add_or_merge(account.id, product.id, 2).await.unwrap();
        let err = service.add_or_merge(account.id, product.id, 2).await.unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));
        assert_eq!(store.cart_lines(account.id).await[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_unknown_product_and_account() {
        let (_, service, account, _) = setup(3).await;

        let err = service
            .add_or_merge(account.id, ProductId::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound(_)));

        let err = service.get_cart(UserId::new()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let (store, service, account, product) = setup(3).await;

        let err = service
            .apply_batch(
                account.id,
                &[
                    CartItemDelta {
                        product_id: product.id,
                        quantity: 1,
                    },
                    CartItemDelta {
                        product_id: ProductId::new(),
                        quantity: 1,
                    },
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::ProductNotFound(_)));
        assert!(store.cart_lines(account.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_fee_refreshed_on_merge() {
        let (store, service, account, mut product) = setup(10).await;

        service.add_or_merge(account.id, product.id, 1).await.unwrap();

        product.price = Money::from_cents(1200);
        let mut uow = store.begin().await.unwrap();
        uow.insert_product(&product).await.unwrap();
        uow.commit().await.unwrap();

        let view = service.add_or_merge(account.id, product.id, 1).await.unwrap();
        assert_eq!(view.lines[0].fee, Money::from_cents(1200));
        assert_eq!(view.total, Money::from_cents(2400));
    }

    #[tokio::test]
    async fn test_locked_cart_rejects_mutation() {
        let (store, service, account, product) = setup(10).await;
        service.add_or_merge(account.id, product.id, 1).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.try_lock_cart(account.id, Money::from_cents(1000))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let err = service.add_or_merge(account.id, product.id, 1).await.unwrap_err();
        assert!(matches!(err, CheckoutError::CartLocked(_)));

        let err = service.clear(account.id).await.unwrap_err();
        assert!(matches!(err, CheckoutError::CartLocked(_)));
        assert_eq!(store.cart_lines(account.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (store, service, account, product) = setup(10).await;
        service.add_or_merge(account.id, product.id, 2).await.unwrap();

        let view = service.clear(account.id).await.unwrap();
        assert!(view.lines.is_empty());
        assert!(view.total.is_zero());

        service.clear(account.id).await.unwrap();
        assert!(store.cart_lines(account.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_line_total_overflow_rejected_without_panic() {
        let (store, service, account, mut product) = setup(10).await;
        product.price = Money::from_cents(4_000_000_000_000_000_000);
        let mut uow = store.begin().await.unwrap();
        uow.insert_product(&product).await.unwrap();
        uow.commit().await.unwrap();

        let err = service.add_or_merge(account.id, product.id, 3).await.unwrap_err();

        assert!(matches!(err, CheckoutError::AmountOverflow(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Capacity);
        assert!(store.cart_lines(account.id).await.is_empty());
        assert!(store.account(account.id).await.unwrap().cart_total.is_zero());
    }

    #[tokio::test]
    async fn test_cart_total_overflow_rolls_back_batch() {
        let (store, service, account, mut first) = setup(10).await;
        first.price = Money::from_cents(4_000_000_000_000_000_000);
        let second = Product::new(
            "Gadget",
            Money::from_cents(4_000_000_000_000_000_000),
            10,
            "tools",
        );
        let mut uow = store.begin().await.unwrap();
        uow.insert_product(&first).await.unwrap();
        uow.insert_product(&second).await.unwrap();
        uow.commit().await.unwrap();

        service.add_or_merge(account.id, first.id, 2).await.unwrap();
        let err = service
            .add_or_merge(account.id, second.id, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::AmountOverflow("cart total")));
        let lines = store.cart_lines(account.id).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, first.id);
        assert_eq!(
            store.account(account.id).await.unwrap().cart_total,
            Money::from_cents(8_000_000_000_000_000_000)
        );
    }
}
