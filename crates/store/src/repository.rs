use async_trait::async_trait;
use common::{OrderId, PaymentId, ProductId, UserId};
use domain::{Account, CartLine, Money, NewOrder, NewPayment, Order, OrderLine, Payment, Product};

use crate::Result;

/// Account rows: the cart lock and cached cart total.
#[async_trait]
pub trait AccountRepository: Send {
    /// Loads an account. Backends that lock rows hold the account row
    /// until the unit of work ends.
    async fn get_account(&mut self, user_id: UserId) -> Result<Option<Account>>;

    async fn insert_account(&mut self, account: &Account) -> Result<()>;

    /// Persists the lock flag and cart total of an existing account.
    async fn update_account(&mut self, account: &Account) -> Result<()>;

    /// Sets the cart lock and total only if the lock is currently clear.
    ///
    /// Returns `false` when the account was already locked (or does not
    /// exist); nothing is written in that case.
    async fn try_lock_cart(&mut self, user_id: UserId, cart_total: Money) -> Result<bool>;
}

/// Cart lines keyed by (user, product).
#[async_trait]
pub trait CartRepository: Send {
    /// Returns the user's lines in insertion order.
    async fn get_cart_lines(&mut self, user_id: UserId) -> Result<Vec<CartLine>>;

    /// Inserts the line or replaces quantity, fee and `updated_at` of the
    /// existing (user, product) line.
    async fn upsert_cart_line(&mut self, line: &CartLine) -> Result<()>;

    async fn delete_cart_line(&mut self, user_id: UserId, product_id: ProductId) -> Result<()>;

    /// Deletes every line of the user, returning how many were removed.
    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64>;
}

/// Product price and stock.
#[async_trait]
pub trait InventoryRepository: Send {
    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>>;

    async fn insert_product(&mut self, product: &Product) -> Result<()>;

    /// Takes `amount` units from stock, re-checking availability at write
    /// time.
    ///
    /// Fails with `InsufficientStock` rather than letting stock go
    /// negative, and with `NotFound` for an unknown product.
    async fn decrement_stock(&mut self, product_id: ProductId, amount: u32) -> Result<Product>;
}

/// Append-only order ledger.
#[async_trait]
pub trait OrderRepository: Send {
    /// Inserts an order header and returns it with its assigned id.
    async fn create_order(&mut self, order: &NewOrder) -> Result<Order>;

    async fn create_order_line(&mut self, line: &OrderLine) -> Result<()>;

    /// Returns the lines of an order in insertion order.
    async fn get_order_lines(&mut self, order_id: OrderId) -> Result<Vec<OrderLine>>;

    /// Loads an order with its lines.
    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    async fn find_order_by_payment(&mut self, payment_id: PaymentId) -> Result<Option<Order>>;

    /// Lists a user's orders, newest first.
    async fn list_orders_for_user(
        &mut self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Order>>;
}

/// Payment ledger.
#[async_trait]
pub trait PaymentRepository: Send {
    /// Inserts a pending payment and returns it with its assigned id.
    async fn create_payment(&mut self, payment: &NewPayment) -> Result<Payment>;

    /// Loads a payment. Backends that lock rows hold the payment row
    /// until the unit of work ends.
    async fn get_payment(&mut self, payment_id: PaymentId) -> Result<Option<Payment>>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Lists a user's payments, newest first.
    async fn list_payments_for_user(
        &mut self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Payment>>;
}

/// A set of repository operations applied atomically.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] discards
/// every write made through it.
#[async_trait]
pub trait UnitOfWork:
    AccountRepository + CartRepository + InventoryRepository + OrderRepository + PaymentRepository
{
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Entry point to a storage backend.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Starts a unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

#[async_trait]
impl<T: Store + ?Sized> Store for std::sync::Arc<T> {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        (**self).begin().await
    }
}
