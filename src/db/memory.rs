use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::StoreError;
use super::operation::{Assignment, Entity, Operation, Transaction};
use super::record::{OrderRelation, Query, Record, Table};
use super::store::{Repository, Store};
use crate::models::{self, Address, Order, Product};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Same contract as the Postgres store, including the non-negative product
// quantity constraint. A transaction is applied to a staged copy of the
// tables under the write lock and swapped in only if every operation
// succeeds, so concurrent transactions are serialized.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: Vec<Order>,
    products: Vec<Product>,
}

impl Tables {
    fn apply(&mut self, operation: Operation) -> Result<(), StoreError> {
        operation.validate()?;

        match operation {
            Operation::Insert(Entity::Order(order)) => insert(&mut self.orders, order),
            Operation::Insert(Entity::Product(product)) => {
                check_quantity(&product)?;
                insert(&mut self.products, product)
            }
            Operation::Update {
                table: Table::Orders,
                condition,
                assignment,
            } => {
                for order in self.orders.iter_mut().filter(|o| o.matches(&condition)) {
                    assign(order, &assignment)?;
                    order.updated_at = models::now();
                }
                Ok(())
            }
            Operation::Update {
                table: Table::Products,
                condition,
                assignment,
            } => {
                // Zero matching rows is not an error, like a SQL UPDATE
                for product in self.products.iter_mut().filter(|p| p.matches(&condition)) {
                    assign(product, &assignment)?;
                    check_quantity(product)?;
                }
                Ok(())
            }
        }
    }
}

fn insert<R: Record>(rows: &mut Vec<R>, record: R) -> Result<(), StoreError> {
    let key = record.key();
    if rows.iter().any(|row| row.key() == key) {
        return Err(StoreError::DuplicateKey(format!("{}_pkey ({})", R::TABLE, key)));
    }
    rows.push(record);
    Ok(())
}

fn assign<R: Record>(record: &mut R, assignment: &Assignment) -> Result<(), StoreError> {
    let current = record.field(assignment.column);
    let value = assignment.expr.evaluate(assignment.column, current)?;
    record.set_field(assignment.column, value)
}

fn check_quantity(product: &Product) -> Result<(), StoreError> {
    if product.quantity < 0 {
        return Err(StoreError::ConstraintViolation("products_quantity_check".to_string()));
    }
    Ok(())
}

/// Access to the backing table of a record type
trait MemoryTable: Record {
    fn rows(tables: &Tables) -> &Vec<Self>;
    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self>;

    /// Drop relations the query did not ask for
    fn project(self, _query: &Query<Self>) -> Self {
        self
    }

    fn overwrite(stored: &mut Self, record: &Self) {
        *stored = record.clone();
    }
}

impl MemoryTable for Order {
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.orders
    }

    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.orders
    }

    fn project(mut self, query: &Query<Self>) -> Self {
        if !query.loads(OrderRelation::Items) {
            self.items.clear();
        }
        if !query.loads(OrderRelation::Address) {
            self.address = Address::default();
        }
        self
    }

    fn overwrite(stored: &mut Self, record: &Self) {
        let created_at = stored.created_at;
        *stored = record.clone();
        stored.created_at = created_at;
        stored.updated_at = models::now();
    }
}

impl MemoryTable for Product {
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.products
    }

    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.products
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the given products
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                orders: Vec::new(),
                products: products.into_iter().collect(),
            }),
        }
    }

    pub async fn product(&self, id: &str) -> Option<Product> {
        self.tables
            .read()
            .await
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn transaction(&self, transaction: Transaction) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();

        for operation in transaction {
            staged.apply(operation)?;
        }

        *tables = staged;
        Ok(())
    }
}

impl MemoryStore {
    async fn find_rows<R: MemoryTable>(&self, query: &Query<R>) -> Result<Vec<R>, StoreError> {
        query.validate()?;

        let tables = self.tables.read().await;
        Ok(R::rows(&tables)
            .iter()
            .filter(|row| row.matches(query.condition()))
            .cloned()
            .map(|row| row.project(query))
            .collect())
    }

    async fn update_row<R: MemoryTable>(&self, record: &R) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let key = record.key();

        let stored = R::rows_mut(&mut tables)
            .iter_mut()
            .find(|row| row.key() == key)
            .ok_or(StoreError::RecordNotFound {
                table: R::TABLE,
                key,
            })?;

        R::overwrite(stored, record);
        Ok(())
    }
}

#[async_trait]
impl Repository<Order> for MemoryStore {
    async fn find(&self, query: &Query<Order>) -> Result<Vec<Order>, StoreError> {
        self.find_rows(query).await
    }

    async fn update(&self, record: &Order) -> Result<(), StoreError> {
        self.update_row(record).await
    }
}

#[async_trait]
impl Repository<Product> for MemoryStore {
    async fn find(&self, query: &Query<Product>) -> Result<Vec<Product>, StoreError> {
        self.find_rows(query).await
    }

    async fn update(&self, record: &Product) -> Result<(), StoreError> {
        self.update_row(record).await
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::operation::Condition;
    use crate::models::{Item, OrderStatus};
    use uuid::Uuid;

    fn product(id: &str, quantity: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("product {id}"),
            price: 1.0,
            quantity,
        }
    }

    fn order(customer_id: Uuid) -> Order {
        Order::new(
            customer_id,
            vec![Item {
                product_id: "p-1".to_string(),
                quantity: 2,
                price: 4.0,
            }],
            Address {
                address_line1: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                ..Address::default()
            },
            "555-0100",
        )
    }

    fn decrement(id: &str, amount: i64) -> Operation {
        Operation::update(
            Table::Products,
            Condition::new().eq("id", id),
            Assignment::decrement("quantity", amount),
        )
    }

    #[tokio::test]
    async fn test_transaction_commits_all_operations() {
        let store = MemoryStore::with_products([product("p-1", 10)]);
        let order = order(Uuid::new_v4());

        let tx = Transaction::new()
            .push(Operation::insert(Entity::Order(order.clone())))
            .push(decrement("p-1", 2));
        store.transaction(tx).await.unwrap();

        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.product("p-1").await.unwrap().quantity, 8);
    }

    #[tokio::test]
    async fn test_failed_operation_rolls_back_earlier_ones() {
        let store = MemoryStore::with_products([product("p-1", 10), product("p-2", 1)]);

        let tx = Transaction::new()
            .push(Operation::insert(Entity::Order(order(Uuid::new_v4()))))
            .push(decrement("p-1", 2))
            .push(decrement("p-2", 5));
        let err = store.transaction(tx).await.unwrap_err();

        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.product("p-1").await.unwrap().quantity, 10);
        assert_eq!(store.product("p-2").await.unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_duplicate_order_insert_is_rejected() {
        let store = MemoryStore::new();
        let order = order(Uuid::new_v4());

        store
            .transaction(Transaction::new().push(Operation::insert(Entity::Order(order.clone()))))
            .await
            .unwrap();
        let err = store
            .transaction(Transaction::new().push(Operation::insert(Entity::Order(order))))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateKey(_)));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_decrement_of_missing_product_touches_nothing() {
        let store = MemoryStore::with_products([product("p-1", 3)]);

        store
            .transaction(Transaction::new().push(decrement("ghost", 1)))
            .await
            .unwrap();

        assert_eq!(store.product("p-1").await.unwrap().quantity, 3);
    }

    #[tokio::test]
    async fn test_find_honours_condition_and_preload() {
        let store = MemoryStore::new();
        let customer = Uuid::new_v4();
        let mine = order(customer);
        let theirs = order(Uuid::new_v4());

        let tx = Transaction::new()
            .push(Operation::insert(Entity::Order(mine.clone())))
            .push(Operation::insert(Entity::Order(theirs)));
        store.transaction(tx).await.unwrap();

        let bare = Query::<Order>::new(Condition::new().eq("customer_id", customer));
        let found: Vec<Order> = store.find(&bare).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].items.is_empty());
        assert_eq!(found[0].address, Address::default());

        let loaded = bare
            .clone()
            .preload(OrderRelation::Items)
            .preload(OrderRelation::Address);
        let found: Vec<Order> = store.find(&loaded).await.unwrap();
        assert_eq!(found, vec![mine]);
    }

    #[tokio::test]
    async fn test_update_overwrites_by_primary_key() {
        let store = MemoryStore::new();
        let mut stored = order(Uuid::new_v4());
        store
            .transaction(Transaction::new().push(Operation::insert(Entity::Order(stored.clone()))))
            .await
            .unwrap();

        stored.status = OrderStatus::Shipped;
        stored.phone = "555-0199".to_string();
        store.update(&stored).await.unwrap();

        let query = Query::<Order>::new(Condition::new().eq("order_id", stored.order_id.clone()));
        let found = store.find_one(&query).await.unwrap().unwrap();
        assert_eq!(found.status, OrderStatus::Shipped);
        assert_eq!(found.phone, "555-0199");
        assert_eq!(found.created_at, stored.created_at);
        assert_eq!(found.updated_at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[tokio::test]
    async fn test_overflowing_decrement_aborts_without_panicking() {
        let store = MemoryStore::with_products([product("p-1", i64::MAX)]);

        let tx = Transaction::new()
            .push(Operation::insert(Entity::Order(order(Uuid::new_v4()))))
            .push(decrement("p-1", -1));
        let err = store.transaction(tx).await.unwrap_err();

        assert!(matches!(err, StoreError::OutOfRange(_)));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.product("p-1").await.unwrap().quantity, i64::MAX);
    }

    #[tokio::test]
    async fn test_update_of_unknown_record_is_not_found() {
        let store = MemoryStore::new();
        let err = Repository::<Product>::update(&store, &product("nope", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { table: Table::Products, .. }));
    }
}
