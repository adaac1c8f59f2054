use std::sync::Arc;

use tracing::Span;
use uuid::Uuid;

use crate::db::{
    Assignment, Condition, Entity, Operation, OrderRelation, Query, Repository, Store,
    StoreError, Table, Transaction,
};
use crate::models::Order;

// ============================================================================
// Order Service
// ============================================================================
//
// Orchestrates: Order → Transaction → Store
//
// CreateOrder writes the order and decrements every referenced product in a
// single transaction. Reads eagerly load items and address.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no orders found")]
    NoOrdersFound,

    #[error("order not found")]
    OrderNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Insert the order, then one store-side `quantity = quantity - n` per item
pub fn create_order_transaction(order: &Order) -> Transaction {
    order.items.iter().fold(
        Transaction::new().push(Operation::insert(Entity::Order(order.clone()))),
        |tx, item| {
            tx.push(Operation::update(
                Table::Products,
                Condition::new().eq("id", item.product_id.clone()),
                Assignment::decrement("quantity", i64::from(item.quantity)),
            ))
        },
    )
}

pub struct OrderService<S> {
    store: Arc<S>,
    span: Span,
}

impl<S> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            span: self.span.clone(),
        }
    }
}

impl<S: Repository<Order>> OrderService<S> {
    /// `span` is the logging context every event from this service is attached to
    pub fn new(store: Arc<S>, span: Span) -> Self {
        Self { store, span }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn create_order(&self, order: &Order) -> Result<(), ServiceError> {
        let transaction = create_order_transaction(order);

        tracing::debug!(
            parent: &self.span,
            order_id = %order.order_id,
            operations = transaction.len(),
            "Built order transaction"
        );

        self.store.transaction(transaction).await?;

        tracing::info!(
            parent: &self.span,
            order_id = %order.order_id,
            customer_id = %order.customer_id,
            item_count = order.items.len(),
            total_price = order.total_price,
            "✅ Order created and inventory decremented"
        );
        Ok(())
    }

    pub async fn get_orders(&self, customer_id: Uuid) -> Result<Vec<Order>, ServiceError> {
        let query = Query::<Order>::new(Condition::new().eq("customer_id", customer_id))
            .preload(OrderRelation::Items)
            .preload(OrderRelation::Address);

        let orders = self.store.find(&query).await?;
        if orders.is_empty() {
            return Err(ServiceError::NoOrdersFound);
        }

        tracing::debug!(parent: &self.span, customer_id = %customer_id, count = orders.len(), "Loaded orders");
        Ok(orders)
    }

    pub async fn get_order(&self, customer_id: Uuid, order_id: &str) -> Result<Order, ServiceError> {
        let query = Query::<Order>::new(
            Condition::new()
                .eq("customer_id", customer_id)
                .eq("order_id", order_id),
        )
        .preload(OrderRelation::Items)
        .preload(OrderRelation::Address);

        self.store
            .find_one(&query)
            .await?
            .ok_or(ServiceError::OrderNotFound)
    }

    /// Persist the whole order by primary key. Last writer wins.
    pub async fn update_order(&self, order: &Order) -> Result<(), ServiceError> {
        self.store.update(order).await?;

        tracing::info!(
            parent: &self.span,
            order_id = %order.order_id,
            status = %order.status,
            "Order updated"
        );
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Expr, MemoryStore, Value};
    use crate::models::{Address, Item, OrderStatus, Product};
    use async_trait::async_trait;

    fn product(id: &str, quantity: i64) -> Product {
        Product {
            id: id.to_string(),
            name: id.to_uppercase(),
            price: 2.0,
            quantity,
        }
    }

    fn item(product_id: &str, quantity: i32, price: f64) -> Item {
        Item {
            product_id: product_id.to_string(),
            quantity,
            price,
        }
    }

    fn address() -> Address {
        Address {
            address_line1: "221B Baker Street".to_string(),
            address_line2: "Flat 2".to_string(),
            city: "London".to_string(),
            state: "Greater London".to_string(),
            zip: "NW1 6XE".to_string(),
            country: "UK".to_string(),
        }
    }

    fn service(store: Arc<MemoryStore>) -> OrderService<MemoryStore> {
        OrderService::new(store, Span::none())
    }

    #[test]
    fn test_transaction_is_insert_then_one_decrement_per_item() {
        let order = Order::new(
            Uuid::new_v4(),
            vec![item("p-1", 2, 1.0), item("p-2", 5, 1.0)],
            address(),
            "555",
        );

        let tx = create_order_transaction(&order);
        let ops = tx.operations();

        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], Operation::insert(Entity::Order(order.clone())));
        assert_eq!(
            ops[1],
            Operation::update(
                Table::Products,
                Condition::new().eq("id", "p-1"),
                Assignment::new("quantity", Expr::Subtract(2)),
            )
        );
        match &ops[2] {
            Operation::Update { condition, assignment, .. } => {
                assert_eq!(condition.pairs(), &[("id", Value::from("p-2"))]);
                assert_eq!(assignment.expr, Expr::Subtract(5));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips_fields() {
        let store = Arc::new(MemoryStore::with_products([product("p-1", 10), product("p-2", 10)]));
        let svc = service(store.clone());
        let customer = Uuid::new_v4();
        let order = Order::new(
            customer,
            vec![item("p-1", 3, 9.99), item("p-2", 1, 0.5)],
            address(),
            "+44 20 7946 0000",
        );

        svc.create_order(&order).await.unwrap();
        let found = svc.get_order(customer, &order.order_id).await.unwrap();

        assert_eq!(found.items, order.items);
        assert_eq!(found.address, order.address);
        assert_eq!(found.phone, order.phone);
        assert_eq!(found.total_price, order.total_price);
        assert_eq!(found.status, OrderStatus::Created);
        assert_eq!(store.product("p-1").await.unwrap().quantity, 7);
        assert_eq!(store.product("p-2").await.unwrap().quantity, 9);
    }

    #[tokio::test]
    async fn test_failing_decrement_aborts_whole_order() {
        let store = Arc::new(MemoryStore::with_products([product("p-1", 10), product("p-2", 1)]));
        let svc = service(store.clone());
        let customer = Uuid::new_v4();
        let order = Order::new(
            customer,
            vec![item("p-1", 4, 1.0), item("p-2", 2, 1.0)],
            address(),
            "555",
        );

        let err = svc.create_order(&order).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::ConstraintViolation(_))));

        assert!(matches!(
            svc.get_order(customer, &order.order_id).await,
            Err(ServiceError::OrderNotFound)
        ));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.product("p-1").await.unwrap().quantity, 10);
        assert_eq!(store.product("p-2").await.unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn test_get_orders_for_unknown_customer_is_not_found() {
        let svc = service(Arc::new(MemoryStore::new()));
        let err = svc.get_orders(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NoOrdersFound));
        assert_eq!(err.to_string(), "no orders found");
    }

    #[tokio::test]
    async fn test_get_orders_returns_only_that_customers_orders() {
        let store = Arc::new(MemoryStore::with_products([product("p-1", 100)]));
        let svc = service(store);
        let customer = Uuid::new_v4();

        for _ in 0..3 {
            let order = Order::new(customer, vec![item("p-1", 1, 1.0)], address(), "555");
            svc.create_order(&order).await.unwrap();
        }
        let other = Order::new(Uuid::new_v4(), vec![item("p-1", 1, 1.0)], address(), "555");
        svc.create_order(&other).await.unwrap();

        let orders = svc.get_orders(customer).await.unwrap();
        assert_eq!(orders.len(), 3);
        assert!(orders.iter().all(|o| o.customer_id == customer));
        assert!(orders.iter().all(|o| o.items.len() == 1 && o.address == address()));
    }

    #[tokio::test]
    async fn test_get_order_requires_matching_customer() {
        let store = Arc::new(MemoryStore::with_products([product("p-1", 5)]));
        let svc = service(store);
        let order = Order::new(Uuid::new_v4(), vec![item("p-1", 1, 1.0)], address(), "555");
        svc.create_order(&order).await.unwrap();

        let err = svc.get_order(Uuid::new_v4(), &order.order_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::OrderNotFound));
    }

    #[tokio::test]
    async fn test_update_order_overwrites_status_without_validation() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store);
        let customer = Uuid::new_v4();
        let order = Order::new(customer, vec![], address(), "555");
        svc.create_order(&order).await.unwrap();

        let mut changed = svc.get_order(customer, &order.order_id).await.unwrap();
        changed.status = OrderStatus::from("definitely-not-a-status");
        svc.update_order(&changed).await.unwrap();

        let found = svc.get_order(customer, &order.order_id).await.unwrap();
        assert_eq!(found.status.as_str(), "definitely-not-a-status");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_lose_no_decrements() {
        let store = Arc::new(MemoryStore::with_products([product("hot", 1_000)]));
        let svc = service(store.clone());

        let tasks: Vec<_> = (1..=25)
            .map(|n| {
                let svc = svc.clone();
                tokio::spawn(async move {
                    let order = Order::new(Uuid::new_v4(), vec![item("hot", n, 1.0)], address(), "555");
                    svc.create_order(&order).await
                })
            })
            .collect();

        for result in futures_util::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        // 1 + 2 + ... + 25
        assert_eq!(store.product("hot").await.unwrap().quantity, 1_000 - 325);
        assert_eq!(store.order_count().await, 25);
    }

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn transaction(&self, _transaction: Transaction) -> Result<(), StoreError> {
            Err(StoreError::ConstraintViolation("orders_pkey".to_string()))
        }
    }

    #[async_trait]
    impl Repository<Order> for BrokenStore {
        async fn find(&self, _query: &Query<Order>) -> Result<Vec<Order>, StoreError> {
            Err(StoreError::ConstraintViolation("orders_pkey".to_string()))
        }

        async fn update(&self, _record: &Order) -> Result<(), StoreError> {
            Err(StoreError::RecordNotFound {
                table: Table::Orders,
                key: "o-1".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_store_errors_surface_verbatim() {
        let svc = OrderService::new(Arc::new(BrokenStore), Span::none());
        let order = Order::new(Uuid::new_v4(), vec![], address(), "555");

        let err = svc.create_order(&order).await.unwrap_err();
        assert_eq!(err.to_string(), "constraint violated: orders_pkey");

        let err = svc.update_order(&order).await.unwrap_err();
        assert_eq!(err.to_string(), "record not found in orders: o-1");

        let err = svc.get_orders(order.customer_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
    }
}
