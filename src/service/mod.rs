pub mod order_service;

pub use order_service::{create_order_transaction, OrderService, ServiceError};
