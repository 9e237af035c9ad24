// crates/db/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git error: {0}")]
    Git(#[from] rekal_core::GitError),

    #[error("wire error: {0}")]
    Wire(#[from] rekal_wire::WireError),

    #[error("search index error: {0}")]
    Search(#[from] rekal_search::SearchError),

    #[error("session with content hash {hash} already exists")]
    DuplicateContentHash { hash: String },

    #[error("read-only query rejected: statement is not a SELECT")]
    NotReadOnly,

    #[error("could not determine the user's home directory")]
    NoHomeDir,
}

pub type DbResult<T> = Result<T, DbError>;
