// crates/search/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("read-only query rejected: statement is not a SELECT")]
    NotReadOnly,

    #[error("wire decode error: {0}")]
    Wire(String),

    #[error("invalid file path filter regex: {0}")]
    BadRegex(String),
}

pub type SearchResult<T> = Result<T, SearchError>;
