use std::{
	collections::{BTreeMap, BTreeSet, HashMap},
	future,
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};

use serde_json::{Map, Value};

use cutover_domain::{
	Category, ChangeEvent, GlobalCategory, NewChange, Statement, Template, UserState, quickes,
};
use cutover_storage::{
	BoxFuture, CanonicalStore, CategoryDeletion, ChangePage, Error, ImportResult, Result, Upsert,
	cursor,
};

#[derive(Debug, Clone)]
struct Row<T> {
	value: T,
	deleted_at: Option<i64>,
}

#[derive(Debug, Clone)]
struct StateRow {
	inited: bool,
	preferences: Map<String, Value>,
	updated_at: i64,
}

#[derive(Debug, Default)]
struct UserRows {
	categories: BTreeMap<String, Row<Category>>,
	statements: BTreeMap<String, Row<Statement>>,
	state: Option<StateRow>,
	quickes: Option<(i64, Vec<String>)>,
	changes: Vec<(i64, ChangeEvent)>,
	last_seq: i64,
}

#[derive(Debug, Default)]
struct Inner {
	users: HashMap<String, UserRows>,
	global_categories: BTreeMap<String, Row<GlobalCategory>>,
	global_statements: BTreeMap<(String, String), Row<Statement>>,
	templates: Vec<Template>,
	admins: BTreeSet<String>,
}

/// In-memory [`CanonicalStore`] with the same timestamp guard and cursor semantics as the
/// Postgres backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
	inner: Mutex<Inner>,
	fail_appends: AtomicBool,
	fail_writes: AtomicBool,
	appends: AtomicUsize,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every `append_change` call fail until reset.
	pub fn fail_appends(&self, fail: bool) {
		self.fail_appends.store(fail, Ordering::SeqCst);
	}

	/// Makes every entity write fail until reset. Reads and change appends are unaffected.
	pub fn fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, Ordering::SeqCst);
	}

	/// Successful `append_change` calls so far.
	pub fn append_count(&self) -> usize {
		self.appends.load(Ordering::SeqCst)
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn check_writes(&self) -> Result<()> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err(Error::Sqlx(sqlx::Error::PoolTimedOut));
		}

		Ok(())
	}

	fn list_categories_now(&self, user_id: &str) -> Vec<Category> {
		let inner = self.lock();
		let Some(user) = inner.users.get(user_id) else {
			return Vec::new();
		};

		sorted(
			user.categories
				.values()
				.filter(|row| row.deleted_at.is_none())
				.map(|row| row.value.clone()),
			|c| (c.created, c.id.clone()),
		)
	}

	fn upsert_category_now(&self, user_id: &str, category: &Category) -> Result<Upsert<Category>> {
		self.check_writes()?;

		let mut inner = self.lock();
		let user = inner.users.entry(user_id.to_string()).or_default();

		Ok(upsert_category_in(user, category))
	}

	fn delete_category_now(
		&self,
		user_id: &str,
		category_id: &str,
		deleted_at: i64,
	) -> Result<CategoryDeletion> {
		self.check_writes()?;

		let mut inner = self.lock();
		let Some(user) = inner.users.get_mut(user_id) else {
			return Ok(CategoryDeletion::default());
		};
		let Some(row) = user.categories.get_mut(category_id) else {
			return Ok(CategoryDeletion::default());
		};

		if row.deleted_at.is_some() || row.value.updated_at > deleted_at {
			return Ok(CategoryDeletion::default());
		}

		row.deleted_at = Some(deleted_at);
		row.value.updated_at = deleted_at;

		let mut statement_ids = Vec::new();

		for row in user.statements.values_mut() {
			if row.deleted_at.is_none() && row.value.category_id == category_id {
				row.deleted_at = Some(deleted_at);
				row.value.updated_at = row.value.updated_at.max(deleted_at);

				statement_ids.push(row.value.id.clone());
			}
		}

		statement_ids.sort();

		Ok(CategoryDeletion { deleted: true, statement_ids })
	}

	fn list_statements_now(&self, user_id: &str, category_id: Option<&str>) -> Vec<Statement> {
		let inner = self.lock();
		let Some(user) = inner.users.get(user_id) else {
			return Vec::new();
		};

		sorted(
			user.statements
				.values()
				.filter(|row| row.deleted_at.is_none())
				.filter(|row| category_id.is_none_or(|id| row.value.category_id == id))
				.map(|row| row.value.clone()),
			|s| (s.created, s.id.clone()),
		)
	}

	fn upsert_statement_now(
		&self,
		user_id: &str,
		statement: &Statement,
	) -> Result<Upsert<Statement>> {
		self.check_writes()?;

		let mut inner = self.lock();
		let user = inner.users.entry(user_id.to_string()).or_default();

		upsert_statement_in(user, statement)
	}

	fn delete_statement_now(
		&self,
		user_id: &str,
		statement_id: &str,
		deleted_at: i64,
	) -> Result<bool> {
		self.check_writes()?;

		let mut inner = self.lock();
		let Some(row) =
			inner.users.get_mut(user_id).and_then(|user| user.statements.get_mut(statement_id))
		else {
			return Ok(false);
		};

		Ok(soft_delete(row, deleted_at, |s| s.updated_at, |s, at| s.updated_at = at))
	}

	fn get_user_state_now(&self, user_id: &str) -> Option<UserState> {
		let inner = self.lock();

		state_of(inner.users.get(user_id)?)
	}

	fn set_user_state_now(&self, user_id: &str, state: &UserState) -> Result<Upsert<UserState>> {
		self.check_writes()?;

		let mut inner = self.lock();
		let user = inner.users.entry(user_id.to_string()).or_default();
		let incoming = UserState { quickes: quickes::normalize(&state.quickes), ..state.clone() };

		if let Some(current) = state_of(user)
			&& (current.updated_at > incoming.updated_at
				|| (current.updated_at == incoming.updated_at && current.same_content(&incoming)))
		{
			let current_updated_at = current.updated_at;

			return Ok(Upsert::skipped(current, current_updated_at, incoming.updated_at));
		}

		user.state = Some(StateRow {
			inited: incoming.inited,
			preferences: incoming.preferences.clone(),
			updated_at: incoming.updated_at,
		});
		user.quickes = Some((incoming.updated_at, incoming.quickes.clone()));

		Ok(Upsert::applied(incoming))
	}

	fn set_quickes_now(
		&self,
		user_id: &str,
		slots: &[String],
		updated_at: i64,
	) -> Result<Upsert<Vec<String>>> {
		self.check_writes()?;

		let mut inner = self.lock();
		let user = inner.users.entry(user_id.to_string()).or_default();
		let incoming = quickes::normalize(slots);

		if let Some((current_updated_at, current)) = user.quickes.clone()
			&& (current_updated_at > updated_at
				|| (current_updated_at == updated_at && current == incoming))
		{
			return Ok(Upsert::skipped(current, current_updated_at, updated_at));
		}

		user.quickes = Some((updated_at, incoming.clone()));

		Ok(Upsert::applied(incoming))
	}

	fn list_global_categories_now(&self, include_statements: bool) -> Vec<GlobalCategory> {
		let inner = self.lock();
		let mut categories = sorted(
			inner
				.global_categories
				.values()
				.filter(|row| row.deleted_at.is_none())
				.map(|row| row.value.clone()),
			|c| (c.created, c.id.clone()),
		);

		if include_statements {
			for category in &mut categories {
				category.statements = global_statements_of(&inner, &category.id);
			}
		}

		categories
	}

	fn upsert_global_category_now(
		&self,
		category: &GlobalCategory,
	) -> Result<Upsert<GlobalCategory>> {
		self.check_writes()?;

		let mut inner = self.lock();
		let incoming = GlobalCategory { statements: Vec::new(), ..category.clone() };
		let same = |stored: &GlobalCategory| {
			stored.label == incoming.label && stored.default == incoming.default
		};

		Ok(upsert_row(
			inner.global_categories.entry(incoming.id.clone()),
			&incoming,
			|c| c.updated_at,
			same,
			|value, stored| value.created = stored.created,
		))
	}

	fn delete_global_category_now(&self, category_id: &str, deleted_at: i64) -> Result<bool> {
		self.check_writes()?;

		let mut inner = self.lock();
		let Some(row) = inner.global_categories.get_mut(category_id) else {
			return Ok(false);
		};

		if !soft_delete(row, deleted_at, |c| c.updated_at, |c, at| c.updated_at = at) {
			return Ok(false);
		}

		for ((owner, _), row) in inner.global_statements.iter_mut() {
			if owner == category_id && row.deleted_at.is_none() {
				row.deleted_at = Some(deleted_at);
				row.value.updated_at = row.value.updated_at.max(deleted_at);
			}
		}

		Ok(true)
	}

	fn upsert_global_statement_now(&self, statement: &Statement) -> Result<Upsert<Statement>> {
		self.check_writes()?;

		let mut inner = self.lock();
		let parent_live = inner
			.global_categories
			.get(&statement.category_id)
			.is_some_and(|row| row.deleted_at.is_none());

		if !parent_live {
			return Err(Error::NotFound(format!("Global category {:?}.", statement.category_id)));
		}

		let key = (statement.category_id.clone(), statement.id.clone());

		Ok(upsert_row(
			inner.global_statements.entry(key),
			statement,
			|s| s.updated_at,
			|stored| stored.text == statement.text,
			|value, stored| value.created = stored.created,
		))
	}

	fn delete_global_statement_now(
		&self,
		category_id: &str,
		statement_id: &str,
		deleted_at: i64,
	) -> Result<bool> {
		self.check_writes()?;

		let mut inner = self.lock();
		let key = (category_id.to_string(), statement_id.to_string());
		let Some(row) = inner.global_statements.get_mut(&key) else {
			return Ok(false);
		};

		Ok(soft_delete(row, deleted_at, |s| s.updated_at, |s, at| s.updated_at = at))
	}

	fn import_global_category_now(
		&self,
		user_id: &str,
		category_id: &str,
		force: bool,
		updated_at: i64,
	) -> Result<ImportResult> {
		self.check_writes()?;

		let mut inner = self.lock();
		let exists = inner
			.users
			.get(user_id)
			.and_then(|user| user.categories.get(category_id))
			.is_some_and(|row| row.deleted_at.is_none());

		if exists && !force {
			return Ok(ImportResult::Exists);
		}

		let Some(global) = inner
			.global_categories
			.get(category_id)
			.filter(|row| row.deleted_at.is_none())
			.map(|row| row.value.clone())
		else {
			return Ok(ImportResult::NotFound);
		};
		let statements = global_statements_of(&inner, category_id);
		let user = inner.users.entry(user_id.to_string()).or_default();
		let category = upsert_category_in(user, &global.to_user_category(updated_at)).stored;
		let mut imported = Vec::new();

		for statement in statements {
			let statement = Statement { updated_at, ..statement };

			imported.push(upsert_statement_in(user, &statement)?.stored);
		}

		Ok(ImportResult::Imported { category, statements: imported })
	}

	fn delete_user_now(&self, user_id: &str, deleted_at: i64) -> Result<()> {
		self.check_writes()?;

		let mut inner = self.lock();
		let Some(user) = inner.users.get_mut(user_id) else {
			return Ok(());
		};

		user.state = None;
		user.quickes = None;
		user.changes.clear();

		for row in user.categories.values_mut().filter(|row| row.deleted_at.is_none()) {
			row.deleted_at = Some(deleted_at);
			row.value.updated_at = row.value.updated_at.max(deleted_at);
		}
		for row in user.statements.values_mut().filter(|row| row.deleted_at.is_none()) {
			row.deleted_at = Some(deleted_at);
			row.value.updated_at = row.value.updated_at.max(deleted_at);
		}

		Ok(())
	}

	fn append_change_now(&self, user_id: &str, change: &NewChange) -> Result<ChangeEvent> {
		if self.fail_appends.load(Ordering::SeqCst) {
			return Err(Error::Sqlx(sqlx::Error::PoolTimedOut));
		}

		let mut inner = self.lock();
		let user = inner.users.entry(user_id.to_string()).or_default();

		user.last_seq += 1;

		let event = ChangeEvent::from_new(cursor::format(user.last_seq), change.clone());

		user.changes.push((user.last_seq, event.clone()));
		self.appends.fetch_add(1, Ordering::SeqCst);

		Ok(event)
	}

	fn list_changes_now(&self, user_id: &str, after: &str, limit: u32) -> Result<ChangePage> {
		let after_seq = cursor::parse(after)?;
		let inner = self.lock();
		let changes = inner
			.users
			.get(user_id)
			.map(|user| {
				user.changes
					.iter()
					.filter(|(seq, _)| *seq > after_seq)
					.take(limit.max(1) as usize)
					.map(|(_, event)| event.clone())
					.collect::<Vec<_>>()
			})
			.unwrap_or_default();
		let next_cursor =
			changes.last().map(|event| event.cursor.clone()).unwrap_or_else(|| after.to_string());

		Ok(ChangePage { next_cursor, changes })
	}
}

impl CanonicalStore for MemoryStore {
	fn list_categories<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Vec<Category>>> {
		Box::pin(future::ready(Ok(self.list_categories_now(user_id))))
	}

	fn upsert_category<'a>(
		&'a self,
		user_id: &'a str,
		category: &'a Category,
	) -> BoxFuture<'a, Result<Upsert<Category>>> {
		Box::pin(future::ready(self.upsert_category_now(user_id, category)))
	}

	fn delete_category<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<CategoryDeletion>> {
		Box::pin(future::ready(self.delete_category_now(user_id, category_id, deleted_at)))
	}

	fn list_statements<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Statement>>> {
		Box::pin(future::ready(Ok(self.list_statements_now(user_id, Some(category_id)))))
	}

	fn list_all_statements<'a>(
		&'a self,
		user_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Statement>>> {
		Box::pin(future::ready(Ok(self.list_statements_now(user_id, None))))
	}

	fn upsert_statement<'a>(
		&'a self,
		user_id: &'a str,
		statement: &'a Statement,
	) -> BoxFuture<'a, Result<Upsert<Statement>>> {
		Box::pin(future::ready(self.upsert_statement_now(user_id, statement)))
	}

	fn delete_statement<'a>(
		&'a self,
		user_id: &'a str,
		statement_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(future::ready(self.delete_statement_now(user_id, statement_id, deleted_at)))
	}

	fn get_user_state<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<UserState>>> {
		Box::pin(future::ready(Ok(self.get_user_state_now(user_id))))
	}

	fn set_user_state<'a>(
		&'a self,
		user_id: &'a str,
		state: &'a UserState,
	) -> BoxFuture<'a, Result<Upsert<UserState>>> {
		Box::pin(future::ready(self.set_user_state_now(user_id, state)))
	}

	fn set_quickes<'a>(
		&'a self,
		user_id: &'a str,
		quickes: &'a [String],
		updated_at: i64,
	) -> BoxFuture<'a, Result<Upsert<Vec<String>>>> {
		Box::pin(future::ready(self.set_quickes_now(user_id, quickes, updated_at)))
	}

	fn list_global_categories(
		&self,
		include_statements: bool,
	) -> BoxFuture<'_, Result<Vec<GlobalCategory>>> {
		Box::pin(future::ready(Ok(self.list_global_categories_now(include_statements))))
	}

	fn list_global_statements<'a>(
		&'a self,
		category_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Statement>>> {
		Box::pin(future::ready(Ok(global_statements_of(&self.lock(), category_id))))
	}

	fn upsert_global_category<'a>(
		&'a self,
		category: &'a GlobalCategory,
	) -> BoxFuture<'a, Result<Upsert<GlobalCategory>>> {
		Box::pin(future::ready(self.upsert_global_category_now(category)))
	}

	fn delete_global_category<'a>(
		&'a self,
		category_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(future::ready(self.delete_global_category_now(category_id, deleted_at)))
	}

	fn upsert_global_statement<'a>(
		&'a self,
		statement: &'a Statement,
	) -> BoxFuture<'a, Result<Upsert<Statement>>> {
		Box::pin(future::ready(self.upsert_global_statement_now(statement)))
	}

	fn delete_global_statement<'a>(
		&'a self,
		category_id: &'a str,
		statement_id: &'a str,
		deleted_at: i64,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(future::ready(self.delete_global_statement_now(
			category_id,
			statement_id,
			deleted_at,
		)))
	}

	fn import_global_category<'a>(
		&'a self,
		user_id: &'a str,
		category_id: &'a str,
		force: bool,
		updated_at: i64,
	) -> BoxFuture<'a, Result<ImportResult>> {
		Box::pin(future::ready(self.import_global_category_now(
			user_id,
			category_id,
			force,
			updated_at,
		)))
	}

	fn list_templates(&self) -> BoxFuture<'_, Result<Vec<Template>>> {
		Box::pin(future::ready(Ok(self.lock().templates.clone())))
	}

	fn replace_templates<'a>(&'a self, templates: &'a [Template]) -> BoxFuture<'a, Result<()>> {
		let result = self.check_writes().map(|()| {
			let mut sorted = templates.to_vec();

			sorted.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.id.cmp(&b.id)));

			self.lock().templates = sorted;
		});

		Box::pin(future::ready(result))
	}

	fn is_admin<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(future::ready(Ok(self.lock().admins.contains(user_id))))
	}

	fn replace_admins<'a>(&'a self, user_ids: &'a [String]) -> BoxFuture<'a, Result<()>> {
		let result = self.check_writes().map(|()| {
			self.lock().admins = user_ids.iter().cloned().collect();
		});

		Box::pin(future::ready(result))
	}

	fn delete_user<'a>(&'a self, user_id: &'a str, deleted_at: i64) -> BoxFuture<'a, Result<()>> {
		Box::pin(future::ready(self.delete_user_now(user_id, deleted_at)))
	}

	fn append_change<'a>(
		&'a self,
		user_id: &'a str,
		change: &'a NewChange,
	) -> BoxFuture<'a, Result<ChangeEvent>> {
		Box::pin(future::ready(self.append_change_now(user_id, change)))
	}

	fn list_changes<'a>(
		&'a self,
		user_id: &'a str,
		cursor: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<ChangePage>> {
		Box::pin(future::ready(self.list_changes_now(user_id, cursor, limit)))
	}
}

fn sorted<T, K, I, F>(items: I, key: F) -> Vec<T>
where
	I: Iterator<Item = T>,
	F: Fn(&T) -> K,
	K: Ord,
{
	let mut items = items.collect::<Vec<_>>();

	items.sort_by_key(key);

	items
}

/// Guarded upsert. `keep_created` copies the write-once `created` of a live row onto the
/// incoming value.
fn upsert_row<K, T, U, S, C>(
	entry: std::collections::btree_map::Entry<'_, K, Row<T>>,
	incoming: &T,
	updated_at: U,
	same_content: S,
	keep_created: C,
) -> Upsert<T>
where
	K: Ord,
	T: Clone,
	U: Fn(&T) -> i64,
	S: Fn(&T) -> bool,
	C: Fn(&mut T, &T),
{
	use std::collections::btree_map::Entry;

	match entry {
		Entry::Vacant(slot) => {
			slot.insert(Row { value: incoming.clone(), deleted_at: None });

			Upsert::applied(incoming.clone())
		},
		Entry::Occupied(mut slot) => {
			let row = slot.get_mut();
			let stored_at = updated_at(&row.value);
			let incoming_at = updated_at(incoming);
			let apply = stored_at < incoming_at
				|| (stored_at == incoming_at
					&& (row.deleted_at.is_some() || !same_content(&row.value)));

			if !apply {
				return Upsert::skipped(row.value.clone(), stored_at, incoming_at);
			}

			let mut value = incoming.clone();

			if row.deleted_at.is_none() {
				keep_created(&mut value, &row.value);
			}

			*row = Row { value: value.clone(), deleted_at: None };

			Upsert::applied(value)
		},
	}
}

fn soft_delete<T>(
	row: &mut Row<T>,
	deleted_at: i64,
	updated_at: impl Fn(&T) -> i64,
	set_updated_at: impl Fn(&mut T, i64),
) -> bool {
	if row.deleted_at.is_some() || updated_at(&row.value) > deleted_at {
		return false;
	}

	row.deleted_at = Some(deleted_at);
	set_updated_at(&mut row.value, deleted_at);

	true
}

fn upsert_category_in(user: &mut UserRows, category: &Category) -> Upsert<Category> {
	upsert_row(
		user.categories.entry(category.id.clone()),
		category,
		|c| c.updated_at,
		|stored| stored.same_content(category),
		|value, stored| value.created = stored.created,
	)
}

fn upsert_statement_in(user: &mut UserRows, statement: &Statement) -> Result<Upsert<Statement>> {
	let parent_live = user
		.categories
		.get(&statement.category_id)
		.is_some_and(|row| row.deleted_at.is_none());

	if !parent_live {
		return Err(Error::Conflict(format!(
			"Category {:?} does not exist for statement {:?}.",
			statement.category_id, statement.id
		)));
	}

	Ok(upsert_row(
		user.statements.entry(statement.id.clone()),
		statement,
		|s| s.updated_at,
		|stored| stored.same_content(statement),
		|value, stored| value.created = stored.created,
	))
}

fn state_of(user: &UserRows) -> Option<UserState> {
	if user.state.is_none() && user.quickes.is_none() {
		return None;
	}

	let (slots_at, slots) = user.quickes.clone().unwrap_or_else(|| (0, quickes::defaults()));
	let mut state = UserState { quickes: slots, updated_at: slots_at, ..Default::default() };

	if let Some(row) = user.state.as_ref() {
		state.inited = row.inited;
		state.preferences = row.preferences.clone();
		state.updated_at = state.updated_at.max(row.updated_at);
	}

	Some(state)
}

fn global_statements_of(inner: &Inner, category_id: &str) -> Vec<Statement> {
	sorted(
		inner
			.global_statements
			.iter()
			.filter(|((owner, _), row)| owner == category_id && row.deleted_at.is_none())
			.map(|(_, row)| row.value.clone()),
		|s| (s.created, s.id.clone()),
	)
}
