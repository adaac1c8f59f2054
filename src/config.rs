//! Service configuration from environment variables.

use std::env;
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};

/// Which Data Access Layer implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the gRPC server listens on
    pub grpc_addr: SocketAddr,

    pub store: StoreBackend,

    /// Required for the Postgres backend
    pub database_url: Option<String>,

    pub db_max_connections: u32,

    /// Apply embedded migrations on startup
    pub run_migrations: bool,

    /// Prometheus metrics port
    pub metrics_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            grpc_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            store: StoreBackend::Postgres,
            database_url: None,
            db_max_connections: 10,
            run_migrations: true,
            metrics_port: 9090,
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ORDER_GRPC_ADDR`: gRPC listen address (default: 0.0.0.0:50051)
    /// - `ORDER_STORE`: `postgres` or `memory` (default: postgres)
    /// - `DATABASE_URL`: Postgres connection string (required for postgres)
    /// - `ORDER_DB_MAX_CONNECTIONS`: pool size (default: 10)
    /// - `ORDER_RUN_MIGRATIONS`: apply migrations at startup (default: true)
    /// - `ORDER_METRICS_PORT`: Prometheus metrics port (default: 9090)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let grpc_addr = match lookup("ORDER_GRPC_ADDR") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid ORDER_GRPC_ADDR: {v}"))?,
            None => defaults.grpc_addr,
        };

        let store = match lookup("ORDER_STORE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("invalid ORDER_STORE: {other} (expected postgres or memory)"),
        };

        let database_url = lookup("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when ORDER_STORE=postgres");
        }

        let db_max_connections = match lookup("ORDER_DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid ORDER_DB_MAX_CONNECTIONS: {v}"))?,
            None => defaults.db_max_connections,
        };

        let run_migrations = lookup("ORDER_RUN_MIGRATIONS")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(defaults.run_migrations);

        let metrics_port = match lookup("ORDER_METRICS_PORT") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid ORDER_METRICS_PORT: {v}"))?,
            None => defaults.metrics_port,
        };

        Ok(Self {
            grpc_addr,
            store,
            database_url,
            db_max_connections,
            run_migrations,
            metrics_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_memory_backend_needs_no_database() {
        let config = ServiceConfig::from_lookup(lookup(&[("ORDER_STORE", "memory")])).unwrap();

        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.grpc_addr.port(), 50051);
        assert_eq!(config.metrics_port, 9090);
        assert!(config.run_migrations);
    }

    #[test]
    fn test_postgres_backend_requires_database_url() {
        let err = ServiceConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("ORDER_GRPC_ADDR", "127.0.0.1:6000"),
            ("ORDER_DB_MAX_CONNECTIONS", "3"),
            ("ORDER_RUN_MIGRATIONS", "false"),
            ("ORDER_METRICS_PORT", "9999"),
        ]))
        .unwrap();

        assert_eq!(config.store, StoreBackend::Postgres);
        assert_eq!(config.grpc_addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.db_max_connections, 3);
        assert!(!config.run_migrations);
        assert_eq!(config.metrics_port, 9999);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = ServiceConfig::from_lookup(lookup(&[
            ("ORDER_STORE", "memory"),
            ("ORDER_METRICS_PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ORDER_METRICS_PORT"));

        let err = ServiceConfig::from_lookup(lookup(&[("ORDER_STORE", "redis")])).unwrap_err();
        assert!(err.to_string().contains("ORDER_STORE"));
    }
}
