//! Tree paths of the legacy layout.
//!
//! ```text
//! users/{uid}/Category/{cid}/statements/{sid}
//! users/{uid}/quickes
//! users/{uid}/inited
//! global/Category/{cid}/statements/{sid}
//! admins/{uid}
//! factory/questions
//! ```

use crate::{Error, Result};

pub const USERS: &str = "users";
pub const ADMINS: &str = "admins";
pub const GLOBAL_CATEGORIES: &str = "global/Category";
pub const TEMPLATES: &str = "factory/questions";

pub const CATEGORY: &str = "Category";
pub const STATEMENTS: &str = "statements";
pub const QUICKES: &str = "quickes";
pub const INITED: &str = "inited";
pub const PREFERENCES: &str = "preferences";
/// Timestamp of the last state or quick-phrase write, mirrored next to the state fields.
pub const STATE_UPDATED_AT: &str = "stateUpdatedAt";

/// Rejects ids that would address a different node than intended.
pub fn segment(raw: &str) -> Result<&str> {
	if raw.is_empty() || raw.contains(['/', '.', '#', '$', '[', ']']) {
		return Err(Error::InvalidPath(raw.to_string()));
	}

	Ok(raw)
}

pub fn user(user_id: &str) -> Result<String> {
	Ok(format!("{USERS}/{}", segment(user_id)?))
}

pub fn categories(user_id: &str) -> Result<String> {
	Ok(format!("{}/{CATEGORY}", user(user_id)?))
}

pub fn category(user_id: &str, category_id: &str) -> Result<String> {
	Ok(format!("{}/{}", categories(user_id)?, segment(category_id)?))
}

pub fn statement(user_id: &str, category_id: &str, statement_id: &str) -> Result<String> {
	Ok(format!("{}/{STATEMENTS}/{}", category(user_id, category_id)?, segment(statement_id)?))
}

pub fn admin(user_id: &str) -> Result<String> {
	Ok(format!("{ADMINS}/{}", segment(user_id)?))
}
