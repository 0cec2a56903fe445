//! Test support: throwaway Postgres databases and in-memory doubles for both stores.

mod database;
mod error;
mod memory_store;
mod memory_tree;

pub use database::{TestDatabase, env_dsn, with_test_db};
pub use error::{Error, Result};
pub use memory_store::MemoryStore;
pub use memory_tree::MemoryTree;
