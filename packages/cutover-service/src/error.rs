pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Legacy store error: {message}")]
	Legacy { message: String },
	#[error("Legacy mirror failed: {message}")]
	MirrorFailed { message: String },
}
impl Error {
	pub fn invalid(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}

	pub fn not_found(message: impl Into<String>) -> Self {
		Self::NotFound { message: message.into() }
	}

	/// The canonical write already committed; only the legacy copy is behind.
	pub fn mirror(err: cutover_legacy::Error) -> Self {
		Self::MirrorFailed { message: err.to_string() }
	}
}

impl From<cutover_storage::Error> for Error {
	fn from(err: cutover_storage::Error) -> Self {
		match err {
			cutover_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			cutover_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			cutover_storage::Error::NotFound(message) => Self::NotFound { message },
			// Only raised for a statement whose category is missing, an invalid reference.
			cutover_storage::Error::Conflict(message) => Self::InvalidRequest { message },
		}
	}
}

impl From<cutover_legacy::Error> for Error {
	fn from(err: cutover_legacy::Error) -> Self {
		match err {
			cutover_legacy::Error::InvalidPath(raw) => {
				Self::InvalidRequest { message: format!("Invalid id {raw:?}.") }
			},
			other => Self::Legacy { message: other.to_string() },
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Storage { message: format!("Failed to encode change payload: {err}.") }
	}
}
