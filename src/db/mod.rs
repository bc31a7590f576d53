//! Database module: Postgres connection/migration setup plus CRUD for the
//! five entities in §3.

pub mod config;
pub mod repository;

pub use config::{health_check, init_pool, run_migrations, DatabaseConfig, DatabaseHealth};
