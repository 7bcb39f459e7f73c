pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("query_text must be non-empty.")]
	EmptyQuery,
	#[error("query_text must be at most {max_chars} characters.")]
	QueryTooLong { max_chars: usize },
	#[error("Filter keys must be non-empty.")]
	EmptyFilterKey,
	#[error("Filter key {key} appears more than once.")]
	DuplicateFilterKey { key: String },
	#[error("requester_id must be non-empty.")]
	EmptyRequester,
}
