//! Checkout coordinator: cart lock, payment lifecycle and fulfillment.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use common::{OrderId, PaymentId, UserId};
use domain::{
    Cart, CartLine, GatewayOutcome, NewOrder, NewPayment, Order, OrderLine, Payment,
    PaymentMethod, PaymentStatus,
};
use serde::{Deserialize, Serialize};
use store::{
    AccountRepository, CartRepository, InventoryRepository, OrderRepository, PaymentRepository,
    Store, UnitOfWork,
};

use crate::error::{CheckoutError, Result};
use crate::gateway::PaymentGateway;
use crate::pagination::Pagination;

/// Result of settling a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub payment: Payment,
    /// Set when the payment completed and the order was written.
    pub order_id: Option<OrderId>,
}

/// Orchestrates checkout for a user's cart.
///
/// ```text
/// initiate ──► lock cart ──► payment Pending
///                               │
///            ┌──────────────────┼─────────────────┐
///            ▼                  ▼                 ▼
///       Completed            Failed           Cancelled
///   fulfill (one unit      unlock            unlock
///   of work), unlock
/// ```
///
/// The account's cart lock is the per-user gate: while it is held the cart
/// cannot change and no second checkout can start. Gateway charges are
/// additionally claimed per payment so one coordinator never charges the
/// same payment twice at once.
pub struct CheckoutCoordinator<S, G>
where
    S: Store,
    G: PaymentGateway,
{
    store: S,
    gateway: G,
    charging: Mutex<HashSet<PaymentId>>,
}

/// Marks a payment as being charged; released on drop.
struct ChargeClaim<'a> {
    charging: &'a Mutex<HashSet<PaymentId>>,
    payment_id: PaymentId,
}

impl Drop for ChargeClaim<'_> {
    fn drop(&mut self) {
        self.charging
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.payment_id);
    }
}

impl<S, G> CheckoutCoordinator<S, G>
where
    S: Store,
    G: PaymentGateway,
{
    /// Creates a new checkout coordinator.
    pub fn new(store: S, gateway: G) -> Self {
        Self {
            store,
            gateway,
            charging: Mutex::new(HashSet::new()),
        }
    }

    /// Locks the user's cart and creates a pending payment for its total.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_checkout(&self, user_id: UserId, method: &str) -> Result<Payment> {
        let method = PaymentMethod::parse(method)?;

        let amount = {
            let mut uow = self.store.begin().await?;

            let account = uow
                .get_account(user_id)
                .await?
                .ok_or(CheckoutError::AccountNotFound(user_id))?;
            if account.is_locked() {
                return Err(CheckoutError::CartAlreadyLocked(user_id));
            }

            let cart = Cart::new(uow.get_cart_lines(user_id).await?);
            if cart.is_empty() {
                return Err(CheckoutError::EmptyCart(user_id));
            }
            validate_stock(uow.as_mut(), &cart.lines).await?;

            let amount = cart.total()?;
            if !uow.try_lock_cart(user_id, amount).await? {
                return Err(CheckoutError::CartAlreadyLocked(user_id));
            }
            uow.commit().await?;
            amount
        };

        let new_payment = NewPayment {
            user_id,
            amount,
            method,
        };
        let created = async {
            let mut uow = self.store.begin().await?;
            let payment = uow.create_payment(&new_payment).await?;
            uow.commit().await?;
            Ok::<_, CheckoutError>(payment)
        }
        .await;

        match created {
            Ok(payment) => {
                metrics::counter!("checkout_initiated_total").increment(1);
                tracing::info!(payment_id = %payment.id, %amount, "checkout initiated");
                Ok(payment)
            }
            Err(err) => {
                tracing::warn!(error = %err, "payment creation failed, releasing cart lock");
                if let Err(unlock_err) = self.unlock(user_id).await {
                    tracing::error!(error = %unlock_err, "failed to release cart lock");
                }
                Err(err)
            }
        }
    }

    /// Applies a gateway outcome to a pending payment.
    ///
    /// A completed payment is committed on its own before the cart is
    /// turned into an order. If that second step fails the payment stays
    /// completed, the account stays locked and `FulfillmentFailed` is
    /// returned; see [`Self::resume_fulfillment`].
    #[tracing::instrument(skip(self, outcome), fields(success = outcome.success))]
    pub async fn settle_payment(
        &self,
        payment_id: PaymentId,
        outcome: GatewayOutcome,
    ) -> Result<Settlement> {
        let payment = {
            let mut uow = self.store.begin().await?;

            let mut payment = load_payment(uow.as_mut(), payment_id).await?;
            if !payment.status.can_settle() {
                return Err(CheckoutError::PaymentNotPending {
                    payment_id,
                    status: payment.status,
                });
            }
            payment.settle(&outcome, Utc::now())?;
            uow.update_payment(&payment).await?;

            if !outcome.success {
                release_lock(uow.as_mut(), payment.user_id).await?;
            }
            uow.commit().await?;
            payment
        };

        metrics::counter!("payments_settled_total", "outcome" => payment.status.as_str())
            .increment(1);

        if payment.status != PaymentStatus::Completed {
            tracing::info!(%payment_id, message = %outcome.message, "payment declined");
            return Ok(Settlement {
                payment,
                order_id: None,
            });
        }

        let order = self.fulfill(&payment).await?;
        tracing::info!(%payment_id, order_id = %order.id, "payment settled and order created");

        Ok(Settlement {
            payment,
            order_id: Some(order.id),
        })
    }

    /// Charges the gateway for a pending payment and settles it with the
    /// outcome.
    #[tracing::instrument(skip(self))]
    pub async fn process_payment(&self, payment_id: PaymentId) -> Result<Settlement> {
        let _claim = self.claim_charge(payment_id)?;

        let payment = self.get_payment(payment_id).await?;
        if !payment.status.can_settle() {
            return Err(CheckoutError::PaymentNotPending {
                payment_id,
                status: payment.status,
            });
        }

        let outcome = self.gateway.charge(payment.amount, &payment.method).await?;
        self.settle_payment(payment_id, outcome).await
    }

    /// Runs a whole checkout: initiate, charge and settle.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, user_id: UserId, method: &str) -> Result<Settlement> {
        let start = std::time::Instant::now();

        let payment = self.initiate_checkout(user_id, method).await?;
        let result = self.process_payment(payment.id).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        result
    }

    /// Cancels a pending payment and releases the cart lock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let mut uow = self.store.begin().await?;

        let mut payment = load_payment(uow.as_mut(), payment_id).await?;
        if !payment.status.can_cancel() {
            return Err(CheckoutError::PaymentNotPending {
                payment_id,
                status: payment.status,
            });
        }
        payment.cancel(Utc::now())?;
        uow.update_payment(&payment).await?;
        release_lock(uow.as_mut(), payment.user_id).await?;
        uow.commit().await?;

        metrics::counter!("payments_settled_total", "outcome" => payment.status.as_str())
            .increment(1);
        tracing::info!(%payment_id, "payment cancelled");

        Ok(payment)
    }

    /// Re-runs fulfillment for a completed payment whose order was never
    /// written.
    #[tracing::instrument(skip(self))]
    pub async fn resume_fulfillment(&self, payment_id: PaymentId) -> Result<Settlement> {
        let payment = self.get_payment(payment_id).await?;
        if payment.status != PaymentStatus::Completed {
            return Err(CheckoutError::NotResumable {
                payment_id,
                reason: format!("payment is {}", payment.status),
            });
        }

        let order = self.fulfill(&payment).await?;
        tracing::info!(%payment_id, order_id = %order.id, "fulfillment resumed");

        Ok(Settlement {
            payment,
            order_id: Some(order.id),
        })
    }

    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        let mut uow = self.store.begin().await?;
        load_payment(uow.as_mut(), payment_id).await
    }

    /// Lists a user's payments, newest first.
    pub async fn list_payments(&self, user_id: UserId, page: Pagination) -> Result<Vec<Payment>> {
        let mut uow = self.store.begin().await?;
        ensure_account(uow.as_mut(), user_id).await?;
        Ok(uow
            .list_payments_for_user(user_id, page.limit, page.offset())
            .await?)
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        let mut uow = self.store.begin().await?;
        uow.get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }

    /// Lists a user's orders with their lines, newest first.
    pub async fn list_orders(&self, user_id: UserId, page: Pagination) -> Result<Vec<Order>> {
        let mut uow = self.store.begin().await?;
        ensure_account(uow.as_mut(), user_id).await?;
        Ok(uow
            .list_orders_for_user(user_id, page.limit, page.offset())
            .await?)
    }

    /// Turns the locked cart of a completed payment into an order.
    ///
    /// Runs as one unit of work: nothing is applied unless every step
    /// succeeds.
    async fn fulfill(&self, payment: &Payment) -> Result<Order> {
        match self.try_fulfill(payment.id).await {
            Ok(order) => Ok(order),
            Err(err @ (CheckoutError::NotResumable { .. } | CheckoutError::PaymentNotFound(_))) => {
                Err(err)
            }
            Err(err) => {
                metrics::counter!("fulfillment_failures_total").increment(1);
                tracing::error!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    error = %err,
                    "fulfillment failed, cart stays locked"
                );
                Err(CheckoutError::FulfillmentFailed {
                    payment_id: payment.id,
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn try_fulfill(&self, payment_id: PaymentId) -> Result<Order> {
        let mut uow = self.store.begin().await?;

        let payment = load_payment(uow.as_mut(), payment_id).await?;
        if payment.status != PaymentStatus::Completed {
            return Err(CheckoutError::NotResumable {
                payment_id,
                reason: format!("payment is {}", payment.status),
            });
        }
        if let Some(order) = uow.find_order_by_payment(payment_id).await? {
            return Err(CheckoutError::NotResumable {
                payment_id,
                reason: format!("order {} already exists", order.id),
            });
        }

        let user_id = payment.user_id;
        let mut account = uow
            .get_account(user_id)
            .await?
            .ok_or(CheckoutError::AccountNotFound(user_id))?;
        if !account.is_locked() {
            return Err(CheckoutError::NotResumable {
                payment_id,
                reason: "cart is not locked".to_string(),
            });
        }

        let lines = uow.get_cart_lines(user_id).await?;
        validate_stock(uow.as_mut(), &lines).await?;

        let mut order = uow
            .create_order(&NewOrder::confirmed_from_cart(user_id, payment_id, &lines)?)
            .await?;
        for line in &lines {
            let order_line = OrderLine::from_cart_line(order.id, line);
            uow.create_order_line(&order_line).await?;
            uow.decrement_stock(line.product_id, line.quantity).await?;
            order.lines.push(order_line);
        }

        uow.clear_cart(user_id).await?;
        account.release_after_fulfillment();
        uow.update_account(&account).await?;
        uow.commit().await?;

        Ok(order)
    }

    fn claim_charge(&self, payment_id: PaymentId) -> Result<ChargeClaim<'_>> {
        let mut charging = self
            .charging
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !charging.insert(payment_id) {
            return Err(CheckoutError::PaymentInProgress(payment_id));
        }
        Ok(ChargeClaim {
            charging: &self.charging,
            payment_id,
        })
    }

    async fn unlock(&self, user_id: UserId) -> Result<()> {
        let mut uow = self.store.begin().await?;
        release_lock(uow.as_mut(), user_id).await?;
        uow.commit().await?;
        Ok(())
    }
}

async fn load_payment(uow: &mut dyn UnitOfWork, payment_id: PaymentId) -> Result<Payment> {
    uow.get_payment(payment_id)
        .await?
        .ok_or(CheckoutError::PaymentNotFound(payment_id))
}

async fn ensure_account(uow: &mut dyn UnitOfWork, user_id: UserId) -> Result<()> {
    uow.get_account(user_id)
        .await?
        .map(|_| ())
        .ok_or(CheckoutError::AccountNotFound(user_id))
}

/// Clears the cart lock, keeping the cart and its cached total.
async fn release_lock(uow: &mut dyn UnitOfWork, user_id: UserId) -> Result<()> {
    let mut account = uow
        .get_account(user_id)
        .await?
        .ok_or(CheckoutError::AccountNotFound(user_id))?;
    account.unlock();
    uow.update_account(&account).await?;
    Ok(())
}

/// Fails with `InsufficientStock` for the first line whose product cannot
/// cover its quantity.
async fn validate_stock(uow: &mut dyn UnitOfWork, lines: &[CartLine]) -> Result<()> {
    for line in lines {
        let product = uow
            .get_product(line.product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(line.product_id))?;

        let requested = u64::from(line.quantity);
        if !product.has_stock_for(requested) {
            return Err(CheckoutError::InsufficientStock {
                product_id: product.id,
                requested,
                available: product.stock,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use domain::{Account, Money, Product};
    use store::InMemoryStore;

    struct Fixture {
        store: InMemoryStore,
        gateway: InMemoryGateway,
        coordinator: CheckoutCoordinator<InMemoryStore, InMemoryGateway>,
        account: Account,
        product: Product,
    }

    async fn fixture(stock: u32, quantity: u32) -> Fixture {
        let store = InMemoryStore::new();
        let gateway = InMemoryGateway::approving();
        let account = Account::new("alice");
        let product = Product::new("Widget", Money::from_cents(1000), stock, "tools");

        let mut uow = store.begin().await.unwrap();
        uow.insert_account(&account).await.unwrap();
        uow.insert_product(&product).await.unwrap();
        if quantity > 0 {
            let now = Utc::now();
            uow.upsert_cart_line(&CartLine {
                user_id: account.id,
                product_id: product.id,
                quantity,
                fee: product.price,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        }
        uow.commit().await.unwrap();

        let coordinator = CheckoutCoordinator::new(store.clone(), gateway.clone());
        Fixture {
            store,
            gateway,
            coordinator,
            account,
            product,
        }
    }

    #[tokio::test]
    async fn test_initiate_locks_cart_with_total() {
        let f = fixture(5, 2).await;

        let payment = f
            .coordinator
            .initiate_checkout(f.account.id, "credit_card")
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, Money::from_cents(2000));

        let account = f.store.account(f.account.id).await.unwrap();
        assert!(account.cart_locked);
        assert_eq!(account.cart_total, Money::from_cents(2000));
    }

    #[tokio::test]
    async fn test_initiate_rejects_blank_method_before_locking() {
        let f = fixture(5, 2).await;

        let err = f
            .coordinator
            .initiate_checkout(f.account.id, "  ")
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidPaymentMethod));
        assert!(!f.store.account(f.account.id).await.unwrap().cart_locked);
    }

    #[tokio::test]
    async fn test_initiate_checks_stock_without_mutation() {
        let f = fixture(5, 2).await;
        f.store.set_stock(f.product.id, 1).await;

        let err = f
            .coordinator
            .initiate_checkout(f.account.id, "credit_card")
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
        assert!(!f.store.account(f.account.id).await.unwrap().cart_locked);
        assert_eq!(f.store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_settle_twice_is_rejected() {
        let f = fixture(5, 2).await;
        let payment = f
            .coordinator
            .initiate_checkout(f.account.id, "credit_card")
            .await
            .unwrap();

        f.coordinator
            .settle_payment(payment.id, GatewayOutcome::approved("TXN-1", "ok"))
            .await
            .unwrap();
        let err = f
            .coordinator
            .settle_payment(payment.id, GatewayOutcome::approved("TXN-2", "ok"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::PaymentNotPending {
                status: PaymentStatus::Completed,
                ..
            }
        ));
        assert_eq!(f.store.order_count().await, 1);
        assert_eq!(f.store.product(f.product.id).await.unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_process_payment_charges_once() {
        let f = fixture(5, 1).await;
        let payment = f
            .coordinator
            .initiate_checkout(f.account.id, "paypal")
            .await
            .unwrap();

        let settlement = f.coordinator.process_payment(payment.id).await.unwrap();
        assert_eq!(settlement.payment.status, PaymentStatus::Completed);
        assert!(settlement.order_id.is_some());

        let err = f.coordinator.process_payment(payment.id).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentNotPending { .. }));
        assert_eq!(f.gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_gateway_error_leaves_payment_pending() {
        let f = fixture(5, 1).await;
        let payment = f
            .coordinator
            .initiate_checkout(f.account.id, "paypal")
            .await
            .unwrap();
        f.gateway.set_unavailable(true);

        let err = f.coordinator.process_payment(payment.id).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Gateway(_)));

        let stored = f.coordinator.get_payment(payment.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(f.store.account(f.account.id).await.unwrap().cart_locked);
    }

    #[tokio::test]
    async fn test_cancel_only_pending() {
        let f = fixture(5, 1).await;
        let payment = f
            .coordinator
            .initiate_checkout(f.account.id, "paypal")
            .await
            .unwrap();

        let cancelled = f.coordinator.cancel_payment(payment.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);
        assert!(!f.store.account(f.account.id).await.unwrap().cart_locked);
        assert_eq!(f.store.cart_lines(f.account.id).await.len(), 1);

        let err = f.coordinator.cancel_payment(payment.id).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::PaymentNotPending {
                status: PaymentStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resume_requires_completed_payment() {
        let f = fixture(5, 1).await;
        let payment = f
            .coordinator
            .initiate_checkout(f.account.id, "paypal")
            .await
            .unwrap();

        let err = f
            .coordinator
            .resume_fulfillment(payment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotResumable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let f = fixture(5, 1).await;

        assert!(matches!(
            f.coordinator.get_payment(PaymentId::new()).await,
            Err(CheckoutError::PaymentNotFound(_))
        ));
        assert!(matches!(
            f.coordinator.get_order(OrderId::new()).await,
            Err(CheckoutError::OrderNotFound(_))
        ));
        assert!(matches!(
            f.coordinator
                .list_orders(UserId::new(), Pagination::default())
                .await,
            Err(CheckoutError::AccountNotFound(_))
        ));
        assert!(matches!(
            f.coordinator
                .initiate_checkout(UserId::new(), "paypal")
                .await,
            Err(CheckoutError::AccountNotFound(_))
        ));
    }
}
