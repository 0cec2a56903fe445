use std::sync::Arc;

use serde_json::{Map, Value};

use cutover_domain::{Category, Statement, UserState};

use crate::{BoxFuture, Result, TreeStore, paths, shape};

/// Mirrors canonical mutations into the legacy tree.
pub trait LegacyWriter
where
	Self: Send + Sync,
{
	fn upsert_category<'a>(
		&'a self,
		user_id: &'a str,
		category: &'a Category,
	) -> BoxFuture<'a, Result<()>>;

	/// Removes the category node together with its nested statements.
	fn delete_category<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
	) -> BoxFuture<'a, Result<()>>;

	fn upsert_statement<'a>(
		&'a self,
		user_id: &'a str,
		statement: &'a Statement,
	) -> BoxFuture<'a, Result<()>>;

	fn delete_statement<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
		statement_id: &'a str,
	) -> BoxFuture<'a, Result<()>>;

	fn set_user_state<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserState,
	) -> BoxFuture<'a, Result<()>>;

	fn set_quickes<'a>(
		&'a self,
		user_id: &'a str,
		quickes: &'a [String],
		updated_at: i64,
	) -> BoxFuture<'a, Result<()>>;

	/// Writes an imported category and its statements as one subtree.
	fn import_global_category<'a>(
		&'a self,
		user_id: &'a str,
		category: &'a Category,
		statements: &'a [Statement],
	) -> BoxFuture<'a, Result<()>>;

	fn delete_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

pub struct TreeWriter {
	tree: Arc<dyn TreeStore>,
}
impl TreeWriter {
	pub fn new(tree: Arc<dyn TreeStore>) -> Self {
		Self { tree }
	}

	async fn set(&self, path: String, node: Value) -> Result<()> {
		self.tree.set(&path, &node).await
	}

	async fn update_user(&self, user_id: &str, fields: Map<String, Value>) -> Result<()> {
		let path = paths::user(user_id)?;

		self.tree.update(&path, &fields).await
	}

	async fn delete(&self, path: String) -> Result<()> {
		self.tree.delete(&path).await
	}

	async fn upsert_category_inner(&self, user_id: &str, category: &Category) -> Result<()> {
		let path = paths::category(user_id, &category.id)?;
		let mut fields = match shape::category_node(category) {
			Value::Object(map) => map,
			_ => Map::new(),
		};

		// `update` keeps the nested statements; a category without `default` must not keep a
		// stale flag.
		if category.default.is_none() {
			fields.insert("default".to_string(), Value::Null);
		}

		self.tree.update(&path, &fields).await
	}

	async fn set_user_state_inner(&self, user_id: &str, state: &UserState) -> Result<()> {
		let mut fields = Map::new();

		fields.insert(paths::INITED.to_string(), Value::Bool(state.inited));
		fields.insert(paths::QUICKES.to_string(), Value::from(state.quickes.clone()));
		fields.insert(paths::PREFERENCES.to_string(), Value::Object(state.preferences.clone()));
		fields.insert(paths::STATE_UPDATED_AT.to_string(), Value::from(state.updated_at));

		self.update_user(user_id, fields).await
	}

	async fn set_quickes_inner(
		&self,
		user_id: &str,
		quickes: &[String],
		updated_at: i64,
	) -> Result<()> {
		let mut fields = Map::new();

		fields.insert(paths::QUICKES.to_string(), Value::from(quickes.to_vec()));
		fields.insert(paths::STATE_UPDATED_AT.to_string(), Value::from(updated_at));

		self.update_user(user_id, fields).await
	}
}

impl LegacyWriter for TreeWriter {
	fn upsert_category<'a>(
		&'a self,
		user_id: &'a str,
		category: &'a Category,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.upsert_category_inner(user_id, category))
	}

	fn delete_category<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.delete(paths::category(user_id, category_id)?).await })
	}

	fn upsert_statement<'a>(
		&'a self,
		user_id: &'a str,
		statement: &'a Statement,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let path = paths::statement(user_id, &statement.category_id, &statement.id)?;

			self.set(path, shape::statement_node(statement)).await
		})
	}

	fn delete_statement<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
		statement_id: &'a str,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.delete(paths::statement(user_id, category_id, statement_id)?).await
		})
	}

	fn set_user_state<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserState,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.set_user_state_inner(user_id, state))
	}

	fn set_quickes<'a>(
		&'a self,
		user_id: &'a str,
		quickes: &'a [String],
		updated_at: i64,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.set_quickes_inner(user_id, quickes, updated_at))
	}

	fn import_global_category<'a>(
		&'a self,
		user_id: &'a str,
		category: &'a Category,
		statements: &'a [Statement],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let path = paths::category(user_id, &category.id)?;

			self.set(path, shape::category_tree(category, statements)).await
		})
	}

	fn delete_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.delete(paths::user(user_id)?).await })
	}
}
