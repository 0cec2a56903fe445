use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// A user-owned phrase category. Field names match what clients already consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
	pub id: String,
	pub label: String,
	pub created: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default: Option<bool>,
	#[serde(rename = "aiUse", default)]
	pub ai_use: bool,
	#[serde(default)]
	pub updated_at: i64,
}
impl Category {
	/// True when every client-visible field except `updated_at` matches. `created` is written
	/// once per live row and is not compared.
	pub fn same_content(&self, other: &Self) -> bool {
		self.id == other.id
			&& self.label == other.label
			&& self.default == other.default
			&& self.ai_use == other.ai_use
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
	pub id: String,
	#[serde(rename = "categoryId")]
	pub category_id: String,
	pub text: String,
	pub created: i64,
	#[serde(default)]
	pub updated_at: i64,
}
impl Statement {
	pub fn same_content(&self, other: &Self) -> bool {
		self.id == other.id && self.category_id == other.category_id && self.text == other.text
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserState {
	pub inited: bool,
	pub quickes: Vec<String>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub preferences: Map<String, Value>,
	#[serde(default)]
	pub updated_at: i64,
}
impl UserState {
	pub fn same_content(&self, other: &Self) -> bool {
		self.inited == other.inited
			&& self.quickes == other.quickes
			&& self.preferences == other.preferences
	}
}

/// An entry of the shared template catalog. Users import these into their own categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCategory {
	pub id: String,
	pub label: String,
	pub created: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default: Option<bool>,
	#[serde(default)]
	pub updated_at: i64,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub statements: Vec<Statement>,
}
impl GlobalCategory {
	pub fn to_user_category(&self, updated_at: i64) -> Category {
		Category {
			id: self.id.clone(),
			label: self.label.clone(),
			created: self.created,
			default: self.default,
			ai_use: false,
			updated_at,
		}
	}
}

/// Onboarding question template. Stored and synced only; the onboarding flow lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
	pub id: String,
	pub label: String,
	pub phrases: Vec<String>,
	pub category: String,
	#[serde(rename = "type")]
	pub kind: String,
	pub order_index: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
	Category,
	Statement,
	UserState,
	Quickes,
	User,
}
impl EntityType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Category => "category",
			Self::Statement => "statement",
			Self::UserState => "user_state",
			Self::Quickes => "quickes",
			Self::User => "user",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"category" => Some(Self::Category),
			"statement" => Some(Self::Statement),
			"user_state" => Some(Self::UserState),
			"quickes" => Some(Self::Quickes),
			"user" => Some(Self::User),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
	Upsert,
	Delete,
}
impl ChangeOp {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Upsert => "upsert",
			Self::Delete => "delete",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"upsert" => Some(Self::Upsert),
			"delete" => Some(Self::Delete),
			_ => None,
		}
	}
}

/// A change that has not been assigned a cursor yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChange {
	pub entity_type: EntityType,
	pub entity_id: String,
	pub op: ChangeOp,
	pub payload: Value,
	pub updated_at: i64,
}
impl NewChange {
	pub fn upsert<T>(
		entity_type: EntityType,
		entity_id: impl Into<String>,
		snapshot: &T,
		updated_at: i64,
	) -> serde_json::Result<Self>
	where
		T: Serialize,
	{
		Ok(Self {
			entity_type,
			entity_id: entity_id.into(),
			op: ChangeOp::Upsert,
			payload: serde_json::to_value(snapshot)?,
			updated_at,
		})
	}

	pub fn delete(entity_type: EntityType, entity_id: impl Into<String>, updated_at: i64) -> Self {
		let entity_id = entity_id.into();

		Self {
			entity_type,
			payload: serde_json::json!({ "id": entity_id }),
			entity_id,
			op: ChangeOp::Delete,
			updated_at,
		}
	}
}

/// One committed entry of a user's change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub cursor: String,
	pub entity_type: EntityType,
	pub entity_id: String,
	pub op: ChangeOp,
	#[serde(serialize_with = "serialize_payload")]
	pub payload: Value,
	pub updated_at: i64,
}
impl ChangeEvent {
	pub fn from_new(cursor: String, change: NewChange) -> Self {
		Self {
			cursor,
			entity_type: change.entity_type,
			entity_id: change.entity_id,
			op: change.op,
			payload: change.payload,
			updated_at: change.updated_at,
		}
	}

	/// Drops the per-event cursor; page responses carry a single cursor instead.
	pub fn without_cursor(mut self) -> Self {
		self.cursor.clear();

		self
	}
}

fn serialize_payload<S>(payload: &Value, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	if payload.is_null() { Map::new().serialize(serializer) } else { payload.serialize(serializer) }
}
