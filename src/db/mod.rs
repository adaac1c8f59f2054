// ============================================================================
// Data Access Layer
// ============================================================================
//
// - operation/ - immutable transaction operations (insert, conditioned update)
// - record/    - typed records, columns and queries
// - store/     - Store / Repository traits
// - postgres/  - sqlx-backed implementation
// - memory/    - in-process implementation with the same semantics
//
// ============================================================================

mod error;
mod operation;
mod record;
mod store;

pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use operation::{Assignment, Condition, Entity, Expr, Operation, Transaction};
pub use postgres::PgStore;
pub use record::{NoRelation, OrderRelation, Query, Record, Table, Value};
pub use store::{Repository, Store};
