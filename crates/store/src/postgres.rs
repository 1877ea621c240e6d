use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, PaymentId, ProductId, UserId};
use domain::{
    Account, CartLine, Money, NewOrder, NewPayment, Order, OrderLine, OrderStatus, Payment,
    PaymentMethod, PaymentStatus, Product,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    repository::{
        AccountRepository, CartRepository, InventoryRepository, OrderRepository,
        PaymentRepository, Store, UnitOfWork,
    },
};

/// PostgreSQL-backed store implementation.
///
/// Each unit of work is one database transaction. Account and payment
/// reads take row locks (`FOR UPDATE`) so concurrent checkouts for the
/// same user queue behind each other.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// Unit of work backed by an open transaction. Dropping it rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("{column} out of range: {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Decode(format!("{column} out of range: {value}")))
}

fn row_to_account(row: &PgRow) -> Result<Account> {
    Ok(Account {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        username: row.try_get("username")?,
        cart_locked: row.try_get("lock_cart")?,
        cart_total: Money::from_cents(row.try_get("total_cart")?),
    })
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: to_u32(row.try_get("stock")?, "stock")?,
        category: row.try_get("category")?,
    })
}

fn row_to_cart_line(row: &PgRow) -> Result<CartLine> {
    Ok(CartLine {
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        fee: Money::from_cents(row.try_get("fee_cents")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    let method: String = row.try_get("payment_method")?;

    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        status: status.parse::<PaymentStatus>().map_err(StoreError::Decode)?,
        method: PaymentMethod::parse(&method).map_err(|e| StoreError::Decode(e.to_string()))?,
        gateway_transaction_id: row.try_get("gateway_transaction_id")?,
        gateway_response: row.try_get("gateway_response")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        payment_id: row
            .try_get::<Option<Uuid>, _>("payment_id")?
            .map(PaymentId::from_uuid),
        total: Money::from_cents(row.try_get("total_cents")?),
        status: status.parse::<OrderStatus>().map_err(StoreError::Decode)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        lines: Vec::new(),
    })
}

fn row_to_order_line(row: &PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("price_cents")?),
    })
}

const ORDER_COLUMNS: &str = "id, user_id, payment_id, total_cents, status, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, user_id, amount_cents, status, payment_method, \
     gateway_transaction_id, gateway_response, created_at, updated_at";

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for PgUnitOfWork {
    async fn get_account(&mut self, user_id: UserId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, lock_cart, total_cart
            FROM users
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn insert_account(&mut self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, lock_cart, total_cart)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.username)
        .bind(account.cart_locked)
        .bind(account.cart_total.cents())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET lock_cart = $2, total_cart = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.cart_locked)
        .bind(account.cart_total.cents())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Account", account.id));
        }
        Ok(())
    }

    async fn try_lock_cart(&mut self, user_id: UserId, cart_total: Money) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET lock_cart = TRUE, total_cart = $2, updated_at = NOW()
            WHERE id = $1 AND lock_cart = FALSE
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(cart_total.cents())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CartRepository for PgUnitOfWork {
    async fn get_cart_lines(&mut self, user_id: UserId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, product_id, quantity, fee_cents, created_at, updated_at
            FROM cart_items
            WHERE user_id = $1
            ORDER BY created_at ASC, product_id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(row_to_cart_line).collect()
    }

    async fn upsert_cart_line(&mut self, line: &CartLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity, fee_cents, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, product_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                fee_cents = EXCLUDED.fee_cents,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(line.user_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(to_i32(line.quantity, "quantity")?)
        .bind(line.fee.cents())
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_cart_line(&mut self, user_id: UserId, product_id: ProductId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id.as_uuid())
            .bind(product_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl InventoryRepository for PgUnitOfWork {
    async fn get_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price_cents, stock, category
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, category)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(to_i32(product.stock, "stock")?)
        .bind(&product.category)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn decrement_stock(&mut self, product_id: ProductId, amount: u32) -> Result<Product> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING id, name, price_cents, stock, category
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(to_i32(amount, "stock")?)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(row) = row {
            return row_to_product(&row);
        }

        match self.get_product(product_id).await? {
            Some(product) => Err(StoreError::InsufficientStock {
                product_id,
                requested: amount,
                available: product.stock,
            }),
            None => Err(StoreError::not_found("Product", product_id)),
        }
    }
}

#[async_trait]
impl OrderRepository for PgUnitOfWork {
    async fn create_order(&mut self, order: &NewOrder) -> Result<Order> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO orders (id, user_id, payment_id, total_cents, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {ORDER_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(order.user_id.as_uuid())
            .bind(order.payment_id.map(|id| id.as_uuid()))
            .bind(order.total.cents())
            .bind(order.status.as_str())
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await?;

        row_to_order(&row)
    }

    async fn create_order_line(&mut self, line: &OrderLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, quantity, price_cents)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(line.order_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(to_i32(line.quantity, "quantity")?)
        .bind(line.unit_price.cents())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_order_lines(&mut self, order_id: OrderId) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, price_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(row_to_order_line).collect()
    }

    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = row_to_order(&row)?;
        order.lines = self.get_order_lines(order.id).await?;
        Ok(Some(order))
    }

    async fn find_order_by_payment(&mut self, payment_id: PaymentId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_id = $1");
        let row = sqlx::query(&sql)
            .bind(payment_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = row_to_order(&row)?;
        order.lines = self.get_order_lines(order.id).await?;
        Ok(Some(order))
    }

    async fn list_orders_for_user(
        &mut self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&mut *self.tx)
            .await?;

        let mut orders = rows.iter().map(row_to_order).collect::<Result<Vec<_>>>()?;
        for order in &mut orders {
            order.lines = self.get_order_lines(order.id).await?;
        }
        Ok(orders)
    }
}

#[async_trait]
impl PaymentRepository for PgUnitOfWork {
    async fn create_payment(&mut self, payment: &NewPayment) -> Result<Payment> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO payments (id, user_id, amount_cents, status, payment_method, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {PAYMENT_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(payment.user_id.as_uuid())
            .bind(payment.amount.cents())
            .bind(PaymentStatus::Pending.as_str())
            .bind(payment.method.as_str())
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await?;

        row_to_payment(&row)
    }

    async fn get_payment(&mut self, payment_id: PaymentId) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(payment_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                gateway_transaction_id = $3,
                gateway_response = $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(&payment.gateway_transaction_id)
        .bind(&payment.gateway_response)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Payment", payment.id));
        }
        Ok(())
    }

    async fn list_payments_for_user(
        &mut self,
        user_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter().map(row_to_payment).collect()
    }
}
