use async_trait::async_trait;

use super::error::StoreError;
use super::operation::Transaction;
use super::record::{Query, Record};

// ============================================================================
// Store Traits - Data Access Layer contract
// ============================================================================
//
// `Store` executes batched transactions; `Repository<R>` adds typed reads and
// primary-key updates for a single record type.
//
// ============================================================================

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Execute every operation in order, committing all of them or none
    async fn transaction(&self, transaction: Transaction) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Repository<R: Record>: Store {
    /// Rows matching the query's condition, with requested relations loaded
    async fn find(&self, query: &Query<R>) -> Result<Vec<R>, StoreError>;

    /// Overwrite the stored record with the same primary key
    async fn update(&self, record: &R) -> Result<(), StoreError>;

    async fn find_one(&self, query: &Query<R>) -> Result<Option<R>, StoreError> {
        Ok(self.find(query).await?.into_iter().next())
    }
}
