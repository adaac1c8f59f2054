pub mod convert;
pub mod grpc;

pub use grpc::{ErrorKind, HandlerError, OrderHandler};
