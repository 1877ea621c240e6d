//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use domain::{
    Account, CartLine, Money, NewOrder, NewPayment, OrderLine, OrderStatus, PaymentMethod,
    PaymentStatus, Product,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    AccountRepository, CartRepository, InventoryRepository, OrderRepository, PaymentRepository,
    PostgresStore, Store, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!("../../../migrations/001_create_shop_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders, payments, cart_items, products, users")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

async fn seed(store: &PostgresStore, stock: u32) -> (Account, Product) {
    let account = Account::new(format!("user-{}", uuid::Uuid::new_v4()));
    let product = Product::new("Widget", Money::from_cents(1000), stock, "tools");

    let mut uow = store.begin().await.unwrap();
    uow.insert_account(&account).await.unwrap();
    uow.insert_product(&product).await.unwrap();
    uow.commit().await.unwrap();

    (account, product)
}

fn cart_line(account: &Account, product: &Product, quantity: u32) -> CartLine {
    let now = Utc::now();
    CartLine {
        user_id: account.id,
        product_id: product.id,
        quantity,
        fee: product.price,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[serial]
async fn test_account_roundtrip_and_lock() {
    let store = get_test_store().await;
    let (account, _) = seed(&store, 5).await;

    let mut uow = store.begin().await.unwrap();
    assert!(
        uow.try_lock_cart(account.id, Money::from_cents(2500))
            .await
            .unwrap()
    );
    assert!(!uow.try_lock_cart(account.id, Money::zero()).await.unwrap());
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let loaded = uow.get_account(account.id).await.unwrap().unwrap();
    assert!(loaded.cart_locked);
    assert_eq!(loaded.cart_total, Money::from_cents(2500));
}

#[tokio::test]
#[serial]
async fn test_rollback_on_drop() {
    let store = get_test_store().await;
    let (account, product) = seed(&store, 5).await;

    {
        let mut uow = store.begin().await.unwrap();
        uow.upsert_cart_line(&cart_line(&account, &product, 2))
            .await
            .unwrap();
        uow.decrement_stock(product.id, 2).await.unwrap();
    }

    let mut uow = store.begin().await.unwrap();
    assert!(uow.get_cart_lines(account.id).await.unwrap().is_empty());
    assert_eq!(uow.get_product(product.id).await.unwrap().unwrap().stock, 5);
}

#[tokio::test]
#[serial]
async fn test_cart_upsert_and_clear() {
    let store = get_test_store().await;
    let (account, product) = seed(&store, 5).await;

    let mut uow = store.begin().await.unwrap();
    uow.upsert_cart_line(&cart_line(&account, &product, 2))
        .await
        .unwrap();
    uow.upsert_cart_line(&cart_line(&account, &product, 3))
        .await
        .unwrap();
    let lines = uow.get_cart_lines(account.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);

    assert_eq!(uow.clear_cart(account.id).await.unwrap(), 1);
    assert_eq!(uow.clear_cart(account.id).await.unwrap(), 0);
    uow.commit().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_decrement_stock_never_goes_negative() {
    let store = get_test_store().await;
    let (_, product) = seed(&store, 2).await;

    let mut uow = store.begin().await.unwrap();
    assert_eq!(uow.decrement_stock(product.id, 2).await.unwrap().stock, 0);

    let err = uow.decrement_stock(product.id, 1).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientStock {
            requested: 1,
            available: 0,
            ..
        }
    ));

    let err = uow
        .decrement_stock(domain::ProductId::new(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[serial]
async fn test_payment_and_order_ledger() {
    let store = get_test_store().await;
    let (account, product) = seed(&store, 5).await;

    let mut uow = store.begin().await.unwrap();
    let mut payment = uow
        .create_payment(&NewPayment {
            user_id: account.id,
            amount: Money::from_cents(2000),
            method: PaymentMethod::parse("credit_card").unwrap(),
        })
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    payment
        .settle(
            &domain::GatewayOutcome::approved("TXN-42", "approved"),
            Utc::now(),
        )
        .unwrap();
    uow.update_payment(&payment).await.unwrap();

    let order = uow
        .create_order(&NewOrder {
            user_id: account.id,
            payment_id: Some(payment.id),
            total: Money::from_cents(2000),
            status: OrderStatus::Confirmed,
        })
        .await
        .unwrap();
    uow.create_order_line(&OrderLine {
        order_id: order.id,
        product_id: product.id,
        quantity: 2,
        unit_price: Money::from_cents(1000),
    })
    .await
    .unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    let loaded = uow.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, PaymentStatus::Completed);
    assert_eq!(loaded.gateway_transaction_id.as_deref(), Some("TXN-42"));

    let by_payment = uow
        .find_order_by_payment(payment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_payment.id, order.id);
    assert_eq!(by_payment.lines.len(), 1);
    assert_eq!(by_payment.lines[0].line_total(), Ok(Money::from_cents(2000)));

    let orders = uow.list_orders_for_user(account.id, 10, 0).await.unwrap();
    assert_eq!(orders.len(), 1);
    let payments = uow.list_payments_for_user(account.id, 10, 0).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert!(
        uow.list_payments_for_user(account.id, 10, 1)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
#[serial]
async fn test_account_row_lock_serializes_units_of_work() {
    let store = get_test_store().await;
    let (account, _) = seed(&store, 5).await;

    let mut first = store.begin().await.unwrap();
    first.get_account(account.id).await.unwrap().unwrap();

    let contender = store.clone();
    let user_id = account.id;
    let handle = tokio::spawn(async move {
        let mut uow = contender.begin().await.unwrap();
        uow.get_account(user_id).await.unwrap();
        let locked = uow.try_lock_cart(user_id, Money::zero()).await.unwrap();
        uow.commit().await.unwrap();
        locked
    });

    assert!(
        first
            .try_lock_cart(account.id, Money::from_cents(100))
            .await
            .unwrap()
    );
    first.commit().await.unwrap();

    assert!(!handle.await.unwrap());
}
