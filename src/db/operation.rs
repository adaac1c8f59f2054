use super::error::StoreError;
use super::record::{Record, Table, Value};
use crate::models::{Order, Product};

// ============================================================================
// Transaction Building Blocks
// ============================================================================
//
// A transaction is an ordered list of immutable operations. Each operation
// is constructed fresh and appended; the store commits all of them or none.
//
// ============================================================================

/// Conjunction of `column = value` pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    pairs: Vec<(&'static str, Value)>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.pairs.push((column, value.into()));
        self
    }

    pub fn pairs(&self) -> &[(&'static str, Value)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// New column value, possibly computed from the current one inside the store
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Set(Value),
    Add(i64),
    Subtract(i64),
}

impl Expr {
    pub fn evaluate(&self, column: &str, current: Option<Value>) -> Result<Value, StoreError> {
        match (self, current) {
            (Expr::Set(value), _) => Ok(value.clone()),
            (Expr::Add(n), Some(Value::Int(v))) => v
                .checked_add(*n)
                .map(Value::Int)
                .ok_or_else(|| StoreError::OutOfRange(column.to_string())),
            (Expr::Subtract(n), Some(Value::Int(v))) => v
                .checked_sub(*n)
                .map(Value::Int)
                .ok_or_else(|| StoreError::OutOfRange(column.to_string())),
            _ => Err(StoreError::TypeMismatch {
                column: column.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: &'static str,
    pub expr: Expr,
}

impl Assignment {
    pub fn new(column: &'static str, expr: Expr) -> Self {
        Self { column, expr }
    }

    /// `column = column - amount`, evaluated by the store
    pub fn decrement(column: &'static str, amount: i64) -> Self {
        Self::new(column, Expr::Subtract(amount))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Order(Order),
    Product(Product),
}

impl Entity {
    pub fn table(&self) -> Table {
        match self {
            Entity::Order(_) => Order::TABLE,
            Entity::Product(_) => Product::TABLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Insert(Entity),
    Update {
        table: Table,
        condition: Condition,
        assignment: Assignment,
    },
}

impl Operation {
    pub fn insert(entity: Entity) -> Self {
        Operation::Insert(entity)
    }

    pub fn update(table: Table, condition: Condition, assignment: Assignment) -> Self {
        Operation::Update {
            table,
            condition,
            assignment,
        }
    }

    pub fn table(&self) -> Table {
        match self {
            Operation::Insert(entity) => entity.table(),
            Operation::Update { table, .. } => *table,
        }
    }

    /// Reject updates that would touch every row or name unknown columns
    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            Operation::Insert(_) => Ok(()),
            Operation::Update {
                table,
                condition,
                assignment,
            } => {
                if condition.is_empty() {
                    return Err(StoreError::MissingCondition(*table));
                }
                for (column, _) in condition.pairs() {
                    table.check_column(column)?;
                }
                table.check_column(assignment.column)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    operations: Vec<Operation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.operations.iter().try_for_each(Operation::validate)
    }
}

impl IntoIterator for Transaction {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}
