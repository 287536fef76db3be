pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Citation violation: {message}")]
	CitationViolation { message: String },
	#[error("Job was cancelled.")]
	Cancelled,
	#[error("Worker lease was lost.")]
	LeaseLost,
}
impl From<statdoc_storage::Error> for Error {
	fn from(err: statdoc_storage::Error) -> Self {
		match err {
			statdoc_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			statdoc_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			statdoc_storage::Error::NotFound(message) => Self::NotFound { message },
			statdoc_storage::Error::Conflict(message) => Self::Conflict { message },
			statdoc_storage::Error::Encoding(message) => Self::Storage { message },
		}
	}
}
impl From<regex::Error> for Error {
	fn from(err: regex::Error) -> Self {
		Self::InvalidRequest { message: format!("Invalid configured pattern: {err}.") }
	}
}
