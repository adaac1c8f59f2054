use std::fmt;
use std::marker::PhantomData;

use uuid::Uuid;

use super::error::StoreError;
use super::operation::Condition;
use crate::models::{Order, Product};

// ============================================================================
// Tables and Column Values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Orders,
    Products,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Orders => "orders",
            Table::Products => "products",
        }
    }

    /// Columns that may appear in conditions and assignments
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Orders => &["order_id", "customer_id", "phone", "total_price", "status"],
            Table::Products => &["id", "name", "price", "quantity"],
        }
    }

    pub fn check_column(&self, column: &str) -> Result<(), StoreError> {
        if self.columns().contains(&column) {
            Ok(())
        } else {
            Err(StoreError::UnknownColumn {
                table: *self,
                column: column.to_string(),
            })
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Uuid(Uuid),
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

// ============================================================================
// Record - a row type the store knows how to query
// ============================================================================

pub trait Record: Clone + Send + Sync + 'static {
    /// Related collections that can be eagerly loaded with the record
    type Relation: Copy + fmt::Debug + PartialEq + Send + Sync + 'static;

    const TABLE: Table;

    /// Primary key as text
    fn key(&self) -> String;

    fn field(&self, column: &str) -> Option<Value>;

    fn set_field(&mut self, column: &str, value: Value) -> Result<(), StoreError>;

    fn matches(&self, condition: &Condition) -> bool {
        condition
            .pairs()
            .iter()
            .all(|(column, value)| self.field(column).as_ref() == Some(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRelation {
    Items,
    Address,
}

/// Products have nothing to preload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoRelation {}

impl Record for Order {
    type Relation = OrderRelation;

    const TABLE: Table = Table::Orders;

    fn key(&self) -> String {
        self.order_id.clone()
    }

    fn field(&self, column: &str) -> Option<Value> {
        match column {
            "order_id" => Some(Value::Text(self.order_id.clone())),
            "customer_id" => Some(Value::Uuid(self.customer_id)),
            "phone" => Some(Value::Text(self.phone.clone())),
            "total_price" => Some(Value::Float(self.total_price)),
            "status" => Some(Value::Text(self.status.to_string())),
            _ => None,
        }
    }

    fn set_field(&mut self, column: &str, value: Value) -> Result<(), StoreError> {
        match (column, value) {
            ("phone", Value::Text(v)) => self.phone = v,
            ("total_price", Value::Float(v)) => self.total_price = v,
            ("status", Value::Text(v)) => self.status = v.into(),
            (column, _) => {
                Self::TABLE.check_column(column)?;
                return Err(StoreError::TypeMismatch {
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Record for Product {
    type Relation = NoRelation;

    const TABLE: Table = Table::Products;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn field(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::Text(self.id.clone())),
            "name" => Some(Value::Text(self.name.clone())),
            "price" => Some(Value::Float(self.price)),
            "quantity" => Some(Value::Int(self.quantity)),
            _ => None,
        }
    }

    fn set_field(&mut self, column: &str, value: Value) -> Result<(), StoreError> {
        match (column, value) {
            ("name", Value::Text(v)) => self.name = v,
            ("price", Value::Float(v)) => self.price = v,
            ("quantity", Value::Int(v)) => self.quantity = v,
            (column, _) => {
                Self::TABLE.check_column(column)?;
                return Err(StoreError::TypeMismatch {
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Query - typed conditioned lookup with eager loading
// ============================================================================

#[derive(Debug, Clone)]
pub struct Query<R: Record> {
    condition: Condition,
    preload: Vec<R::Relation>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Query<R> {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            preload: Vec::new(),
            _record: PhantomData,
        }
    }

    pub fn preload(mut self, relation: R::Relation) -> Self {
        if !self.preload.contains(&relation) {
            self.preload.push(relation);
        }
        self
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn loads(&self, relation: R::Relation) -> bool {
        self.preload.contains(&relation)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for (column, _) in self.condition.pairs() {
            R::TABLE.check_column(column)?;
        }
        Ok(())
    }
}
