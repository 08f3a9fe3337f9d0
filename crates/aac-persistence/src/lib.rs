//! Postgres-backed durable storage for the engine.

pub mod error;
pub mod pool;
pub mod postgres_repository;
mod rows;

pub use error::PersistenceError;
pub use pool::{create_pool, run_migrations};
pub use postgres_repository::PostgresRepository;
