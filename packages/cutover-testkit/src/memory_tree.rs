use std::{
	future,
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};

use serde_json::{Map, Value};

use cutover_legacy::{BoxFuture, Error, Result, TreeStore};

/// In-memory [`TreeStore`]. Like the hosted store, it never keeps null leaves or empty objects.
#[derive(Debug)]
pub struct MemoryTree {
	root: Mutex<Value>,
	fail_writes: AtomicBool,
	reads: AtomicUsize,
}
impl MemoryTree {
	pub fn new() -> Self {
		Self::with_root(Value::Object(Map::new()))
	}

	pub fn with_root(root: Value) -> Self {
		let mut root = root;

		prune(&mut root);

		Self {
			root: Mutex::new(root),
			fail_writes: AtomicBool::new(false),
			reads: AtomicUsize::new(0),
		}
	}

	/// Makes every write fail with a 503 status until reset.
	pub fn fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, Ordering::SeqCst);
	}

	/// Number of `get` and `child_keys` calls so far.
	pub fn read_count(&self) -> usize {
		self.reads.load(Ordering::SeqCst)
	}

	pub fn snapshot(&self) -> Value {
		self.lock().clone()
	}

	/// The subtree at `path` without counting as a read.
	pub fn peek(&self, path: &str) -> Value {
		node_at(&self.lock(), path).cloned().unwrap_or(Value::Null)
	}

	fn lock(&self) -> MutexGuard<'_, Value> {
		self.root.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn check_writes(&self) -> Result<()> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err(Error::Status { status: 503, body: "unavailable".to_string() });
		}

		Ok(())
	}

	fn get_now(&self, path: &str) -> Value {
		self.reads.fetch_add(1, Ordering::SeqCst);

		node_at(&self.lock(), path).cloned().unwrap_or(Value::Null)
	}

	fn child_keys_now(&self, path: &str) -> Vec<String> {
		self.reads.fetch_add(1, Ordering::SeqCst);

		node_at(&self.lock(), path)
			.and_then(Value::as_object)
			.map(|map| map.keys().cloned().collect())
			.unwrap_or_default()
	}

	fn set_now(&self, path: &str, value: &Value) -> Result<()> {
		self.check_writes()?;

		let mut root = self.lock();

		write_at(&mut root, path, value.clone());
		prune(&mut root);

		Ok(())
	}

	fn update_now(&self, path: &str, fields: &Map<String, Value>) -> Result<()> {
		self.check_writes()?;

		let mut root = self.lock();

		for (key, value) in fields {
			write_at(&mut root, &format!("{path}/{key}"), value.clone());
		}

		prune(&mut root);

		Ok(())
	}
}
impl Default for MemoryTree {
	fn default() -> Self {
		Self::new()
	}
}

impl TreeStore for MemoryTree {
	fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Value>> {
		Box::pin(future::ready(Ok(self.get_now(path))))
	}

	fn child_keys<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(future::ready(Ok(self.child_keys_now(path))))
	}

	fn set<'a>(&'a self, path: &'a str, value: &'a Value) -> BoxFuture<'a, Result<()>> {
		Box::pin(future::ready(self.set_now(path, value)))
	}

	fn update<'a>(
		&'a self,
		path: &'a str,
		fields: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(future::ready(self.update_now(path, fields)))
	}

	fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(future::ready(self.set_now(path, &Value::Null)))
	}
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
	path.split('/').filter(|segment| !segment.is_empty())
}

fn node_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
	segments(path).try_fold(root, |node, segment| node.as_object()?.get(segment))
}

fn write_at(root: &mut Value, path: &str, value: Value) {
	let parts = segments(path).collect::<Vec<_>>();
	let Some((last, parents)) = parts.split_last() else {
		*root = value;

		return;
	};
	let mut node = root;

	for segment in parents {
		if !node.is_object() {
			if value.is_null() {
				return;
			}

			*node = Value::Object(Map::new());
		}

		let Value::Object(map) = node else {
			return;
		};

		node = map.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
	}

	if !node.is_object() {
		if value.is_null() {
			return;
		}

		*node = Value::Object(Map::new());
	}
	if let Value::Object(map) = node {
		map.insert(last.to_string(), value);
	}
}

// Drops null leaves and objects left empty by them.
fn prune(node: &mut Value) {
	if let Value::Object(map) = node {
		for child in map.values_mut() {
			prune(child);
		}

		map.retain(|_, child| {
			!child.is_null() && !matches!(child, Value::Object(children) if children.is_empty())
		});
	}
}
