pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Model error: {message}")]
	Batch { message: String },
	#[error("Ranking error: {message}")]
	Ranking { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
}
impl From<wekiwi_batch::Error> for Error {
	fn from(err: wekiwi_batch::Error) -> Self {
		Self::Batch { message: err.to_string() }
	}
}
impl From<wekiwi_ranking::Error> for Error {
	fn from(err: wekiwi_ranking::Error) -> Self {
		Self::Ranking { message: err.to_string() }
	}
}
impl From<wekiwi_storage::Error> for Error {
	fn from(err: wekiwi_storage::Error) -> Self {
		match err {
			wekiwi_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
			wekiwi_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
