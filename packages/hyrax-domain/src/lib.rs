mod error;
pub mod request;
pub mod result;

pub use error::{Error, Result};
pub use request::{SearchRequest, normalize_query, request_key};
pub use result::{CandidateResult, RankedResult, SearchResults, SourceKind};
