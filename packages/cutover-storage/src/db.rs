use sqlx::{PgPool, postgres::PgPoolOptions};

use cutover_domain::{
	Category, ChangeEvent, GlobalCategory, NewChange, Statement, Template, UserState,
};

use crate::{
	BoxFuture, CanonicalStore, Result, catalog, categories, changes,
	models::{CategoryDeletion, ChangePage, ImportResult, Upsert},
	schema, statements, users,
};

/// The Postgres-backed canonical store.
pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &cutover_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		let lock_id: i64 = 4_611_337;
		// Advisory locks are held per connection. Use a single transaction so the lock is scoped to
		// one connection and automatically released when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(lock_id).execute(&mut *tx).await?;

		for statement in sql.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}

impl CanonicalStore for Db {
	fn list_categories<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Vec<Category>>> {
		Box::pin(categories::list(self, user_id))
	}

	fn upsert_category<'a>(
		&'a self,
		user_id: &'a str,
		category: &'a Category,
	) -> BoxFuture<'a, Result<Upsert<Category>>> {
		Box::pin(categories::upsert(self, user_id, category))
	}

	fn delete_category<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<CategoryDeletion>> {
		Box::pin(categories::delete(self, user_id, category_id, deleted_at))
	}

	fn list_statements<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Statement>>> {
		Box::pin(statements::list(self, user_id, category_id))
	}

	fn list_all_statements<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Statement>>> {
		Box::pin(statements::list_all(self, user_id))
	}

	fn upsert_statement<'a>(
		&'a self,
		user_id: &'a str,
		statement: &'a Statement,
	) -> BoxFuture<'a, Result<Upsert<Statement>>> {
		Box::pin(statements::upsert(self, user_id, statement))
	}

	fn delete_statement<'a>(
		&'a self,
		user_id: &'a str,
		statement_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(statements::delete(self, user_id, statement_id, deleted_at))
	}

	fn get_user_state<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<UserState>>> {
		Box::pin(users::get_state(self, user_id))
	}

	fn set_user_state<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserState,
	) -> BoxFuture<'a, Result<Upsert<UserState>>> {
		Box::pin(users::set_state(self, user_id, state))
	}

	fn set_quickes<'a>(
		&'a self,
		user_id: &'a str,
		quickes: &'a [String],
		updated_at: i64,
	) -> BoxFuture<'a, Result<Upsert<Vec<String>>>> {
		Box::pin(users::set_quickes(self, user_id, quickes, updated_at))
	}

	fn list_global_categories(
		&self,
		include_statements: bool,
	) -> BoxFuture<'_, Result<Vec<GlobalCategory>>> {
		Box::pin(catalog::list_categories(self, include_statements))
	}

	fn list_global_statements<'a>(
		&'a self,
		category_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Statement>>> {
		Box::pin(catalog::list_statements(self, category_id))
	}

	fn upsert_global_category<'a>(
		&'a self,
		category: &'a GlobalCategory,
	) -> BoxFuture<'a, Result<Upsert<GlobalCategory>>> {
		Box::pin(catalog::upsert_category(self, category))
	}

	fn delete_global_category<'a>(
		&'a self,
		category_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(catalog::delete_category(self, category_id, deleted_at))
	}

	fn upsert_global_statement<'a>(
		&'a self,
		statement: &'a Statement,
	) -> BoxFuture<'a, Result<Upsert<Statement>>> {
		Box::pin(catalog::upsert_statement(self, statement))
	}

	fn delete_global_statement<'a>(
		&'a self,
		category_id: &'a str,
		statement_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(catalog::delete_statement(self, category_id, statement_id, deleted_at))
	}

	fn import_global_category<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
		force: bool,
		updated_at: i64,
	) -> BoxFuture<'a, Result<ImportResult>> {
		Box::pin(catalog::import_category(self, user_id, category_id, force, updated_at))
	}

	fn list_templates(&self) -> BoxFuture<'_, Result<Vec<Template>>> {
		Box::pin(catalog::list_templates(self))
	}

	fn replace_templates<'a>(&'a self, templates: &'a [Template]) -> BoxFuture<'a, Result<()>> {
		Box::pin(catalog::replace_templates(self, templates))
	}

	fn is_admin<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(users::is_admin(self, user_id))
	}

	fn replace_admins<'a>(&'a self, user_ids: &'a [String]) -> BoxFuture<'a, Result<()>> {
		Box::pin(users::replace_admins(self, user_ids))
	}

	fn delete_user<'a>(&'a self, user_id: &'a str, deleted_at: i64) -> BoxFuture<'a, Result<()>> {
		Box::pin(users::delete_user(self, user_id, deleted_at))
	}

	fn append_change<'a>(
		&'a self,
		user_id: &'a str,
		change: &'a NewChange,
	) -> BoxFuture<'a, Result<ChangeEvent>> {
		Box::pin(changes::append(self, user_id, change))
	}

	fn list_changes<'a>(
		&'a self,
		user_id: &'a str,
		cursor: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<ChangePage>> {
		Box::pin(changes::list(self, user_id, cursor, limit))
	}
}
