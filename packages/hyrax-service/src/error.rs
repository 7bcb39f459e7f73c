use hyrax_domain::SourceKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Service failures. `Clone` so one failed computation can be handed to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	#[error("Unauthorized: {message}")]
	Unauthorized { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("{source_kind} backend timed out after {timeout_ms} ms.")]
	BackendTimeout { source_kind: SourceKind, timeout_ms: u64 },
	#[error("{source_kind} backend failed: {message}")]
	Backend { source_kind: SourceKind, message: String },
	#[error("Retrieval unavailable: {message}")]
	RetrievalUnavailable { message: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
}
impl Error {
	pub fn backend(source_kind: SourceKind, err: impl std::fmt::Display) -> Self {
		Self::Backend { source_kind, message: err.to_string() }
	}

	/// Whether a caller may retry the same request later.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::RetrievalUnavailable { .. } | Self::BackendTimeout { .. })
	}
}

impl From<hyrax_domain::Error> for Error {
	fn from(err: hyrax_domain::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}

impl From<hyrax_storage::Error> for Error {
	fn from(err: hyrax_storage::Error) -> Self {
		match err {
			hyrax_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::Internal { message: other.to_string() },
		}
	}
}

impl From<hyrax_providers::Error> for Error {
	fn from(err: hyrax_providers::Error) -> Self {
		match err {
			hyrax_providers::Error::Unauthorized =>
				Self::Unauthorized { message: "Credential was rejected.".to_string() },
			other => Self::Internal { message: other.to_string() },
		}
	}
}
