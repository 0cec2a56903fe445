#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Legacy store returned status {status}: {body}")]
	Status { status: u16, body: String },
	#[error("Invalid legacy path segment: {0:?}.")]
	InvalidPath(String),
	#[error("Invalid legacy response: {0}")]
	InvalidResponse(String),
	#[error("Legacy stream ended: {0}")]
	StreamEnded(String),
}
