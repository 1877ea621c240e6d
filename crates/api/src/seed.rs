//! Demo catalog for running without a database.

use domain::{Account, Money, Product};
use store::{AccountRepository, InventoryRepository, Store, StoreError};

/// Identifiers of the seeded demo records.
#[derive(Debug, Clone)]
pub struct DemoData {
    pub account: Account,
    pub products: Vec<Product>,
}

/// Inserts one demo account and a small catalog in a single unit of work.
pub async fn seed_demo_data(store: &dyn Store) -> Result<DemoData, StoreError> {
    let account = Account::new("demo");
    let products = vec![
        Product::new("Mechanical Keyboard", Money::from_cents(8999), 25, "electronics"),
        Product::new("USB-C Cable", Money::from_cents(1299), 200, "electronics"),
        Product::new("Coffee Beans 1kg", Money::from_cents(2450), 40, "grocery"),
        Product::new("Notebook", Money::from_cents(499), 3, "stationery"),
    ];

    let mut uow = store.begin().await?;
    uow.insert_account(&account).await?;
    for product in &products {
        uow.insert_product(product).await?;
    }
    uow.commit().await?;

    Ok(DemoData { account, products })
}

#[cfg(test)]
mod tests {
    use store::InMemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_seed_is_visible() {
        let store = InMemoryStore::new();
        let demo = seed_demo_data(&store).await.unwrap();

        assert!(store.account(demo.account.id).await.is_some());
        for product in &demo.products {
            assert_eq!(store.product(product.id).await.as_ref(), Some(product));
        }
    }
}
