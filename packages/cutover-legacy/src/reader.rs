use std::sync::Arc;

use serde_json::Value;

use cutover_domain::{Category, GlobalCategory, Statement, Template, UserState, clock};

use crate::{BoxFuture, Result, TreeStore, paths, shape};

/// Categories and statements of one user, as stored in the legacy tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserData {
	pub categories: Vec<Category>,
	pub statements: Vec<Statement>,
}
impl UserData {
	pub fn is_empty(&self) -> bool {
		self.categories.is_empty() && self.statements.is_empty()
	}
}

/// Snapshot reads from the legacy store.
pub trait LegacyReader
where
	Self: Send + Sync,
{
	fn fetch_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<UserData>>;

	fn get_user_state<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<UserState>>>;

	fn list_global_categories(&self) -> BoxFuture<'_, Result<Vec<GlobalCategory>>>;

	fn list_templates(&self) -> BoxFuture<'_, Result<Vec<Template>>>;

	fn is_admin<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool>>;

	fn list_admins(&self) -> BoxFuture<'_, Result<Vec<String>>>;

	fn list_user_ids(&self) -> BoxFuture<'_, Result<Vec<String>>>;
}

pub struct TreeReader {
	tree: Arc<dyn TreeStore>,
}
impl TreeReader {
	pub fn new(tree: Arc<dyn TreeStore>) -> Self {
		Self { tree }
	}

	async fn fetch_user_data_inner(&self, user_id: &str) -> Result<UserData> {
		let node = self.tree.get(&paths::categories(user_id)?).await?;

		Ok(user_data_from(&node, clock::now_ms()))
	}

	async fn get_user_state_inner(&self, user_id: &str) -> Result<Option<UserState>> {
		let user = paths::user(user_id)?;
		// The whole user node includes every category; read only the state children.
		let (inited, quickes, preferences, updated_at) = (
			self.tree.get(&format!("{user}/{}", paths::INITED)).await?,
			self.tree.get(&format!("{user}/{}", paths::QUICKES)).await?,
			self.tree.get(&format!("{user}/{}", paths::PREFERENCES)).await?,
			self.tree.get(&format!("{user}/{}", paths::STATE_UPDATED_AT)).await?,
		);
		let mut node = serde_json::Map::new();

		for (key, value) in [
			(paths::INITED, inited),
			(paths::QUICKES, quickes),
			(paths::PREFERENCES, preferences),
			(paths::STATE_UPDATED_AT, updated_at),
		] {
			if !value.is_null() {
				node.insert(key.to_string(), value);
			}
		}

		Ok(shape::user_state_from(&Value::Object(node)))
	}

	async fn list_global_categories_inner(&self) -> Result<Vec<GlobalCategory>> {
		let node = self.tree.get(paths::GLOBAL_CATEGORIES).await?;
		let now = clock::now_ms();
		let mut categories = node
			.as_object()
			.map(|map| {
				map.iter()
					.filter_map(|(key, node)| shape::global_category_from(key, node, now))
					.collect::<Vec<_>>()
			})
			.unwrap_or_default();

		categories.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));

		Ok(categories)
	}

	async fn list_templates_inner(&self) -> Result<Vec<Template>> {
		Ok(shape::templates_from(&self.tree.get(paths::TEMPLATES).await?))
	}

	async fn is_admin_inner(&self, user_id: &str) -> Result<bool> {
		let node = self.tree.get(&paths::admin(user_id)?).await?;

		Ok(match node {
			Value::Null => false,
			Value::Bool(flag) => flag,
			_ => true,
		})
	}

	async fn list_admins_inner(&self) -> Result<Vec<String>> {
		Ok(shape::keys_of(&self.tree.get(paths::ADMINS).await?))
	}

	async fn list_user_ids_inner(&self) -> Result<Vec<String>> {
		let mut ids = self.tree.child_keys(paths::USERS).await?;

		ids.sort();

		Ok(ids)
	}
}

impl LegacyReader for TreeReader {
	fn fetch_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<UserData>> {
		Box::pin(self.fetch_user_data_inner(user_id))
	}

	fn get_user_state<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<UserState>>> {
		Box::pin(self.get_user_state_inner(user_id))
	}

	fn list_global_categories(&self) -> BoxFuture<'_, Result<Vec<GlobalCategory>>> {
		Box::pin(self.list_global_categories_inner())
	}

	fn list_templates(&self) -> BoxFuture<'_, Result<Vec<Template>>> {
		Box::pin(self.list_templates_inner())
	}

	fn is_admin<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(self.is_admin_inner(user_id))
	}

	fn list_admins(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(self.list_admins_inner())
	}

	fn list_user_ids(&self) -> BoxFuture<'_, Result<Vec<String>>> {
		Box::pin(self.list_user_ids_inner())
	}
}

/// Flattens a `Category` map into categories and statements, ordered by creation time.
pub fn user_data_from(node: &Value, now: i64) -> UserData {
	let mut data = UserData::default();
	let Some(map) = node.as_object() else {
		return data;
	};

	for (key, node) in map {
		let Some(category) = shape::category_from(key, node, now) else {
			continue;
		};

		data.statements.extend(shape::nested_statements(&category.id, node, now));
		data.categories.push(category);
	}

	data.categories.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
	data.statements.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));

	data
}
