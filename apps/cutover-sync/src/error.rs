pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Storage(#[from] cutover_storage::Error),
	#[error(transparent)]
	Legacy(#[from] cutover_legacy::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
