//! Adapter over the hierarchical legacy store.
//!
//! [`TreeStore`] is the raw tree API (read or write a JSON subtree at a slash-separated path).
//! [`TreeReader`] and [`TreeWriter`] translate between that tree shape and the domain model,
//! and [`stream`] consumes the store's live change notifications.

pub mod paths;
pub mod reader;
pub mod rtdb;
pub mod shape;
pub mod stream;
pub mod tree;
pub mod writer;

mod error;

pub use error::Error;
pub use reader::{LegacyReader, TreeReader, UserData};
pub use rtdb::RtdbClient;
pub use stream::{EventStream, StreamEvent};
pub use tree::{BoxFuture, TreeStore};
pub use writer::{LegacyWriter, TreeWriter};

pub type Result<T, E = Error> = std::result::Result<T, E>;
