use std::{future::Future, pin::Pin};

use cutover_domain::{
	Category, ChangeEvent, GlobalCategory, NewChange, Statement, Template, UserState,
};

use crate::{
	Result,
	models::{CategoryDeletion, ChangePage, ImportResult, Upsert},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The canonical store contract.
///
/// Upserts are guarded by `updated_at`: a write older than the stored row never replaces it.
/// Deletes are soft, carry a timestamp, and report whether they changed anything, so replaying
/// a delete is a successful no-op.
pub trait CanonicalStore
where
	Self: Send + Sync,
{
	/// Live categories ordered by creation time.
	fn list_categories<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Vec<Category>>>;

	fn upsert_category<'a>(
		&'a self,
		user_id: &'a str,
		category: &'a Category,
	) -> BoxFuture<'a, Result<Upsert<Category>>>;

	/// Soft-deletes the category and cascades to its live statements in one transaction.
	fn delete_category<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<CategoryDeletion>>;

	fn list_statements<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Statement>>>;

	fn list_all_statements<'a>(&'a self, user_id: &'a str)
	-> BoxFuture<'a, Result<Vec<Statement>>>;

	/// Fails with [`crate::Error::Conflict`] unless the statement's category is live.
	fn upsert_statement<'a>(
		&'a self,
		user_id: &'a str,
		statement: &'a Statement,
	) -> BoxFuture<'a, Result<Upsert<Statement>>>;

	fn delete_statement<'a>(
		&'a self,
		user_id: &'a str,
		statement_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<bool>>;

	/// `None` when the user has neither a state row nor quick-phrase slots.
	fn get_user_state<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<UserState>>>;

	fn set_user_state<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserState,
	) -> BoxFuture<'a, Result<Upsert<UserState>>>;

	fn set_quickes<'a>(
		&'a self,
		user_id: &'a str,
		quickes: &'a [String],
		updated_at: i64,
	) -> BoxFuture<'a, Result<Upsert<Vec<String>>>>;

	fn list_global_categories(
		&self,
		include_statements: bool,
	) -> BoxFuture<'_, Result<Vec<GlobalCategory>>>;

	fn list_global_statements<'a>(
		&'a self,
		category_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Statement>>>;

	/// Nested statements on the argument are ignored; use [`Self::upsert_global_statement`].
	fn upsert_global_category<'a>(
		&'a self,
		category: &'a GlobalCategory,
	) -> BoxFuture<'a, Result<Upsert<GlobalCategory>>>;

	fn delete_global_category<'a>(
		&'a self,
		category_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<bool>>;

	fn upsert_global_statement<'a>(
		&'a self,
		statement: &'a Statement,
	) -> BoxFuture<'a, Result<Upsert<Statement>>>;

	fn delete_global_statement<'a>(
		&'a self,
		category_id: &'a str,
		statement_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<bool>>;

	/// Copies a catalog category and its statements into the user's categories.
	fn import_global_category<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
		force: bool,
		updated_at: i64,
	) -> BoxFuture<'a, Result<ImportResult>>;

	fn list_templates(&self) -> BoxFuture<'_, Result<Vec<Template>>>;

	fn replace_templates<'a>(&'a self, templates: &'a [Template]) -> BoxFuture<'a, Result<()>>;

	fn is_admin<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool>>;

	fn replace_admins<'a>(&'a self, user_ids: &'a [String]) -> BoxFuture<'a, Result<()>>;

	/// Erases state, quick phrases and the change log; categories and statements are
	/// soft-deleted. Cursor numbering continues past the erased log.
	fn delete_user<'a>(&'a self, user_id: &'a str, deleted_at: i64) -> BoxFuture<'a, Result<()>>;

	fn append_change<'a>(
		&'a self,
		user_id: &'a str,
		change: &'a NewChange,
	) -> BoxFuture<'a, Result<ChangeEvent>>;

	/// Events strictly after `cursor`, oldest first. `next_cursor` echoes `cursor` when the
	/// page is empty.
	fn list_changes<'a>(
		&'a self,
		user_id: &'a str,
		cursor: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<ChangePage>>;
}
