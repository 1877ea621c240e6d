use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, PaymentId, ProductId, UserId};
use domain::{
    Account, CartLine, Money, NewOrder, NewPayment, Order, OrderLine, Payment, PaymentStatus,
    Product,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    repository::{
        AccountRepository, CartRepository, InventoryRepository, OrderRepository,
        PaymentRepository, Store, UnitOfWork,
    },
};

#[derive(Debug, Clone, Default)]
struct ShopState {
    accounts: HashMap<UserId, Account>,
    products: HashMap<ProductId, Product>,
    /// Insertion order is preserved so carts list deterministically.
    cart_lines: Vec<CartLine>,
    /// Append-only, oldest first.
    orders: Vec<Order>,
    /// Append-only, oldest first.
    payments: Vec<Payment>,
}

#[derive(Debug, Default)]
struct FailurePoints {
    create_payment: AtomicBool,
    create_order: AtomicBool,
}

/// In-memory store implementation for tests and local runs.
///
/// Units of work are serialized behind a single async mutex: a unit of
/// work holds the lock from `begin` until it is committed or dropped. Reads
/// go straight to the shared state. The first write takes a private copy,
/// which replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<ShopState>>,
    failures: Arc<FailurePoints>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail every `create_payment` call.
    pub fn set_fail_on_create_payment(&self, fail: bool) {
        self.failures.create_payment.store(fail, Ordering::SeqCst);
    }

    /// Configures the store to fail every `create_order` call.
    pub fn set_fail_on_create_order(&self, fail: bool) {
        self.failures.create_order.store(fail, Ordering::SeqCst);
    }

    /// Returns a committed account.
    pub async fn account(&self, user_id: UserId) -> Option<Account> {
        self.state.lock().await.accounts.get(&user_id).cloned()
    }

    /// Returns a committed product.
    pub async fn product(&self, product_id: ProductId) -> Option<Product> {
        self.state.lock().await.products.get(&product_id).cloned()
    }

    /// Returns the committed cart lines of a user.
    pub async fn cart_lines(&self, user_id: UserId) -> Vec<CartLine> {
        self.state
            .lock()
            .await
            .cart_lines
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the total number of payments stored.
    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }

    /// Overwrites a product's stock outside of any unit of work.
    pub async fn set_stock(&self, product_id: ProductId, stock: u32) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.stock = stock;
        }
    }

    /// Clears all data.
    pub async fn clear(&self) {
        *self.state.lock().await = ShopState::default();
    }
}

impl InMemoryStore {
    async fn unit_of_work(&self) -> InMemoryUnitOfWork {
        InMemoryUnitOfWork {
            guard: self.state.clone().lock_owned().await,
            working: None,
            failures: self.failures.clone(),
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(self.unit_of_work().await))
    }
}

/// Unit of work over the in-memory state.
pub struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<ShopState>,
    /// Copy taken on first write; `None` while the unit of work only reads.
    working: Option<ShopState>,
    failures: Arc<FailurePoints>,
}

impl InMemoryUnitOfWork {
    fn state(&self) -> &ShopState {
        self.working.as_ref().unwrap_or(&*self.guard)
    }

    fn state_mut(&mut self) -> &mut ShopState {
        let shared = &self.guard;
        self.working.get_or_insert_with(|| ShopState::clone(shared))
    }

    fn find_order(&self, order_id: OrderId) -> Option<&Order> {
        self.state().orders.iter().find(|o| o.id == order_id)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        if let Some(working) = working {
            *guard = working;
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for InMemoryUnitOfWork {
    async fn get_account(&mut self, user_id: UserId) -> Result<Option<Account>> {
        Ok(self.state().accounts.get(&user_id).cloned())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<()> {
        self.state_mut().accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<()> {
        let slot = self
            .state_mut()
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| StoreError::not_found("Account", account.id))?;
        slot.cart_locked = account.cart_locked;
        slot.cart_total = account.cart_total;
        Ok(())
    }

    async fn try_lock_cart(&mut self, user_id: UserId, cart_total: Money) -> Result<bool> {
        match self.state_mut().accounts.get_mut(&user_id) {
            Some(account) if !account.cart_locked => {
                account.cart_locked = true;
                account.cart_total = cart_total;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CartRepository for InMemoryUnitOfWork {
    async fn get_cart_lines(&mut self, user_id: UserId) -> Result<Vec<CartLine>> {
        Ok(self
            .state()
            .cart_lines
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_cart_line(&mut self, line: &CartLine) -> Result<()> {
        let lines = &mut self.state_mut().cart_lines;
        match lines
            .iter_mut()
            .find(|l| l.user_id == line.user_id && l.product_id == line.product_id)
        {
            Some(existing) => {
                existing.quantity = line.quantity;
                existing.fee = line.fee;
                existing.updated_at = line.updated_at;
            }
            None => lines.push(line.clone()),
        }
        Ok(())
    }

    async fn delete_cart_line(&mut self, user_id: UserId, product_id: ProductId) -> Result<()> {
        self.state_mut()
            .cart_lines
            .retain(|l| !(l.user_id == user_id && l.product_id == product_id));
        Ok(())
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64> {
        let lines = &mut self.state_mut().cart_lines;
        let before = lines.len();
        lines.retain(|l| l.user_id != user_id);
        Ok((before - lines.len()) as u64)
    }
}

#[async_trait]
impl InventoryRepository for InMemoryUnitOfWork {
    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state().products.get(&product_id).cloned())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        self.state_mut().products.insert(product.id, product.clone());
        Ok(())
    }

    async fn decrement_stock(&mut self, product_id: ProductId, amount: u32) -> Result<Product> {
        let product = self
            .state_mut()
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("Product", product_id))?;

        if product.stock < amount {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: amount,
                available: product.stock,
            });
        }

        product.stock -= amount;
        Ok(product.clone())
    }
}

#[async_trait]
impl OrderRepository for InMemoryUnitOfWork {
    async fn create_order(&mut self, order: &NewOrder) -> Result<Order> {
        if self.failures.create_order.load(Ordering::SeqCst) {
            tracing::warn!(user_id = %order.user_id, "injected order ledger failure");
            return Err(StoreError::Unavailable("order ledger unavailable".to_string()));
        }

        let now = Utc::now();
        let created = Order {
            id: OrderId::new(),
            user_id: order.user_id,
            payment_id: order.payment_id,
            total: order.total,
            status: order.status,
            created_at: now,
            updated_at: now,
            lines: Vec::new(),
        };
        self.state_mut().orders.push(created.clone());
        Ok(created)
    }

    async fn create_order_line(&mut self, line: &OrderLine) -> Result<()> {
        let order = self
            .state_mut()
            .orders
            .iter_mut()
            .find(|o| o.id == line.order_id)
            .ok_or_else(|| StoreError::not_found("Order", line.order_id))?;
        order.lines.push(line.clone());
        Ok(())
    }

    async fn get_order_lines(&mut self, order_id: OrderId) -> Result<Vec<OrderLine>> {
        Ok(self
            .find_order(order_id)
            .map(|o| o.lines.clone())
            .unwrap_or_default())
    }

    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.find_order(order_id).cloned())
    }

    async fn find_order_by_payment(&mut self, payment_id: PaymentId) -> Result<Option<Order>> {
        Ok(self
            .state()
            .orders
            .iter()
            .find(|o| o.payment_id == Some(payment_id))
            .cloned())
    }

    async fn list_orders_for_user(
        &mut self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Order>> {
        Ok(self
            .state()
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryUnitOfWork {
    async fn create_payment(&mut self, payment: &NewPayment) -> Result<Payment> {
        if self.failures.create_payment.load(Ordering::SeqCst) {
            tracing::warn!(user_id = %payment.user_id, "injected payment ledger failure");
            return Err(StoreError::Unavailable(
                "payment ledger unavailable".to_string(),
            ));
        }

        let now = Utc::now();
        let created = Payment {
            id: PaymentId::new(),
            user_id: payment.user_id,
            amount: payment.amount,
            status: PaymentStatus::Pending,
            method: payment.method.clone(),
            gateway_transaction_id: None,
            gateway_response: None,
            created_at: now,
            updated_at: now,
        };
        self.state_mut().payments.push(created.clone());
        Ok(created)
    }

    async fn get_payment(&mut self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self
            .state()
            .payments
            .iter()
            .find(|p| p.id == payment_id)
            .cloned())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let slot = self
            .state_mut()
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or_else(|| StoreError::not_found("Payment", payment.id))?;
        *slot = payment.clone();
        Ok(())
    }

    async fn list_payments_for_user(
        &mut self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Payment>> {
        Ok(self
            .state()
            .payments
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
