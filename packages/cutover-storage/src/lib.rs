pub mod cursor;
pub mod db;
pub mod models;
pub mod schema;

mod catalog;
mod categories;
mod changes;
mod error;
mod statements;
mod store;
mod users;

pub use error::Error;
pub use models::{ChangePage, CategoryDeletion, ImportResult, Upsert, UpsertStatus};
pub use store::{BoxFuture, CanonicalStore};

pub type Result<T, E = Error> = std::result::Result<T, E>;
