use std::{future::Future, pin::Pin};

use serde_json::{Map, Value};

use crate::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw access to the legacy tree. Paths are slash-separated and relative to the tree root.
pub trait TreeStore
where
	Self: Send + Sync,
{
	/// The subtree at `path`, or `Value::Null` when nothing is stored there.
	fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Value>>;

	/// Child keys of the node at `path` without their subtrees.
	fn child_keys<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

	/// Replaces the subtree at `path`.
	fn set<'a>(&'a self, path: &'a str, value: &'a Value) -> BoxFuture<'a, Result<()>>;

	/// Replaces only the named children of the node at `path`.
	fn update<'a>(&'a self, path: &'a str, fields: &'a Map<String, Value>)
	-> BoxFuture<'a, Result<()>>;

	fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>>;
}
