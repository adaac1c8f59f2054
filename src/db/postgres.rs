use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{PgConnection, PgPool, QueryBuilder};
use tracing::Span;
use uuid::Uuid;

use super::error::StoreError;
use super::operation::{Assignment, Condition, Entity, Expr, Operation, Transaction};
use super::record::{OrderRelation, Query, Record, Table, Value};
use super::store::{Repository, Store};
use crate::models::{Address, Item, Order, Product};

// ============================================================================
// Postgres Store
// ============================================================================
//
// Every transaction runs on one pooled connection inside BEGIN/COMMIT.
// Returning early on error drops the sqlx transaction, which rolls it back.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    span: Span,
}

impl PgStore {
    pub fn new(pool: PgPool, span: Span) -> Self {
        Self { pool, span }
    }

    pub async fn connect(url: &str, max_connections: u32, span: Span) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("failed to connect to Postgres")?;

        tracing::info!(parent: &span, max_connections, "Connected to Postgres");
        Ok(Self::new(pool, span))
    }

    /// Run the embedded schema migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("db migrate failed")?;

        tracing::info!(parent: &self.span, "Migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// SQL helpers
// ============================================================================

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Uuid(v) => builder.push_bind(*v),
        Value::Text(v) => builder.push_bind(v.clone()),
        Value::Int(v) => builder.push_bind(*v),
        Value::Float(v) => builder.push_bind(*v),
    };
}

fn push_where(builder: &mut QueryBuilder<'_, Postgres>, condition: &Condition) {
    for (i, (column, value)) in condition.pairs().iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        builder.push(*column).push(" = ");
        push_value(builder, value);
    }
}

/// `column = <expr>`; arithmetic is evaluated by Postgres against the current row
fn push_assignment(builder: &mut QueryBuilder<'_, Postgres>, assignment: &Assignment) {
    let column = assignment.column;
    builder.push(column).push(" = ");
    match &assignment.expr {
        Expr::Set(value) => push_value(builder, value),
        Expr::Add(n) => {
            builder.push(column).push(" + ").push_bind(*n);
        }
        Expr::Subtract(n) => {
            builder.push(column).push(" - ").push_bind(*n);
        }
    }
}

async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO orders (order_id, customer_id, phone, total_price, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&order.order_id)
    .bind(order.customer_id)
    .bind(&order.phone)
    .bind(order.total_price)
    .bind(order.status.as_str())
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    upsert_address(conn, &order.order_id, &order.address).await?;
    insert_items(conn, &order.order_id, &order.items).await
}

async fn upsert_address(conn: &mut PgConnection, order_id: &str, address: &Address) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO order_addresses (order_id, address_line1, address_line2, city, state, zip, country)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (order_id) DO UPDATE SET
            address_line1 = EXCLUDED.address_line1,
            address_line2 = EXCLUDED.address_line2,
            city = EXCLUDED.city,
            state = EXCLUDED.state,
            zip = EXCLUDED.zip,
            country = EXCLUDED.country
        "#,
    )
    .bind(order_id)
    .bind(&address.address_line1)
    .bind(&address.address_line2)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.zip)
    .bind(&address.country)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_items(conn: &mut PgConnection, order_id: &str, items: &[Item]) -> Result<(), StoreError> {
    if items.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO order_items (order_id, line_no, product_id, quantity, price) ",
    );
    builder.push_values(items.iter().enumerate(), |mut row, (line_no, item)| {
        row.push_bind(order_id.to_string())
            .push_bind(line_no as i32)
            .push_bind(item.product_id.clone())
            .push_bind(item.quantity)
            .push_bind(item.price);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

async fn insert_product(conn: &mut PgConnection, product: &Product) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO products (id, name, price, quantity) VALUES ($1, $2, $3, $4)")
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.quantity)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn apply(conn: &mut PgConnection, operation: &Operation) -> Result<u64, StoreError> {
    operation.validate()?;

    match operation {
        Operation::Insert(Entity::Order(order)) => insert_order(conn, order).await.map(|_| 1),
        Operation::Insert(Entity::Product(product)) => insert_product(conn, product).await.map(|_| 1),
        Operation::Update {
            table,
            condition,
            assignment,
        } => {
            let mut builder = QueryBuilder::<Postgres>::new("UPDATE ");
            builder.push(table.name()).push(" SET ");
            push_assignment(&mut builder, assignment);
            if *table == Table::Orders {
                builder.push(", updated_at = now()");
            }
            push_where(&mut builder, condition);

            let result = builder.build().execute(&mut *conn).await?;
            Ok(result.rows_affected())
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn transaction(&self, transaction: Transaction) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for (index, operation) in transaction.operations().iter().enumerate() {
            let rows = apply(&mut tx, operation).await.inspect_err(|e| {
                tracing::warn!(
                    parent: &self.span,
                    step = index,
                    table = %operation.table(),
                    error = %e,
                    "Transaction step failed, rolling back"
                );
            })?;

            tracing::debug!(
                parent: &self.span,
                step = index,
                table = %operation.table(),
                rows,
                "Applied transaction step"
            );
        }

        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Order repository
// ============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    customer_id: Uuid,
    phone: String,
    total_price: f64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_id: String,
    product_id: String,
    quantity: i32,
    price: f64,
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    order_id: String,
    address_line1: String,
    address_line2: String,
    city: String,
    state: String,
    zip: String,
    country: String,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            order_id: row.order_id,
            customer_id: row.customer_id,
            items: Vec::new(),
            address: Address::default(),
            phone: row.phone,
            total_price: row.total_price,
            status: row.status.into(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Eager loads read orders, items and addresses from one snapshot
const READ_SNAPSHOT: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

impl PgStore {
    async fn load_items(conn: &mut PgConnection, order_ids: &[String]) -> Result<HashMap<String, Vec<Item>>, StoreError> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT order_id, product_id, quantity, price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(order_ids)
        .fetch_all(&mut *conn)
        .await?;

        let mut items: HashMap<String, Vec<Item>> = HashMap::new();
        for row in rows {
            items.entry(row.order_id).or_default().push(Item {
                product_id: row.product_id,
                quantity: row.quantity,
                price: row.price,
            });
        }
        Ok(items)
    }

    async fn load_addresses(conn: &mut PgConnection, order_ids: &[String]) -> Result<HashMap<String, Address>, StoreError> {
        let rows: Vec<AddressRow> = sqlx::query_as(
            r#"
            SELECT order_id, address_line1, address_line2, city, state, zip, country
            FROM order_addresses
            WHERE order_id = ANY($1)
            "#,
        )
        .bind(order_ids)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let address = Address {
                    address_line1: row.address_line1,
                    address_line2: row.address_line2,
                    city: row.city,
                    state: row.state,
                    zip: row.zip,
                    country: row.country,
                };
                (row.order_id, address)
            })
            .collect())
    }
}

#[async_trait]
impl Repository<Order> for PgStore {
    async fn find(&self, query: &Query<Order>) -> Result<Vec<Order>, StoreError> {
        query.validate()?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(READ_SNAPSHOT).execute(&mut *tx).await?;

        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT order_id, customer_id, phone, total_price, status, created_at, updated_at FROM orders",
        );
        push_where(&mut builder, query.condition());
        builder.push(" ORDER BY created_at, order_id");

        let rows = builder.build_query_as::<OrderRow>().fetch_all(&mut *tx).await?;
        let mut orders: Vec<Order> = rows.into_iter().map(Order::from).collect();
        if orders.is_empty() {
            tx.commit().await?;
            return Ok(orders);
        }

        let ids: Vec<String> = orders.iter().map(|o| o.order_id.clone()).collect();

        if query.loads(OrderRelation::Items) {
            let mut items = Self::load_items(&mut tx, &ids).await?;
            for order in &mut orders {
                order.items = items.remove(&order.order_id).unwrap_or_default();
            }
        }

        if query.loads(OrderRelation::Address) {
            let mut addresses = Self::load_addresses(&mut tx, &ids).await?;
            for order in &mut orders {
                order.address = addresses.remove(&order.order_id).unwrap_or_default();
            }
        }

        tx.commit().await?;
        Ok(orders)
    }

    /// Rewrites the order row, its address and its items in one transaction
    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET customer_id = $2, phone = $3, total_price = $4, status = $5, updated_at = now()
            WHERE order_id = $1
            "#,
        )
        .bind(&order.order_id)
        .bind(order.customer_id)
        .bind(&order.phone)
        .bind(order.total_price)
        .bind(order.status.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound {
                table: Order::TABLE,
                key: order.key(),
            });
        }

        upsert_address(&mut tx, &order.order_id, &order.address).await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(&order.order_id)
            .execute(&mut *tx)
            .await?;
        insert_items(&mut tx, &order.order_id, &order.items).await?;

        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Product repository
// ============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price: f64,
    quantity: i64,
}

#[async_trait]
impl Repository<Product> for PgStore {
    async fn find(&self, query: &Query<Product>) -> Result<Vec<Product>, StoreError> {
        query.validate()?;

        let mut builder = QueryBuilder::<Postgres>::new("SELECT id, name, price, quantity FROM products");
        push_where(&mut builder, query.condition());
        builder.push(" ORDER BY id");

        let rows = builder.build_query_as::<ProductRow>().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| Product {
                id: row.id,
                name: row.name,
                price: row.price,
                quantity: row.quantity,
            })
            .collect())
    }

    async fn update(&self, product: &Product) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE products SET name = $2, price = $3, quantity = $4 WHERE id = $1")
            .bind(&product.id)
            .bind(&product.name)
            .bind(product.price)
            .bind(product.quantity)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RecordNotFound {
                table: Product::TABLE,
                key: product.key(),
            });
        }
        Ok(())
    }
}
