// ============================================================================
// Order Management Service
// ============================================================================
//
// Layers, leaves first:
// - db/       - Data Access Layer (Postgres and in-memory stores)
// - service/  - order creation transaction, lookups and updates
// - handler/  - gRPC boundary translation
//
// ============================================================================

pub mod config;
pub mod db;
pub mod handler;
pub mod metrics;
pub mod models;
pub mod service;

/// Generated gRPC types for `proto/order.proto`
pub mod proto {
    tonic::include_proto!("order");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("order_descriptor");
}
