//! Error taxonomy: typed errors spanning the store, filesystem, search,
//! indexing and query subsystems.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SeekError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Indexing(#[from] IndexingError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("store connection unavailable")]
    Unavailable,
    #[error("failed to open store connection: {0}")]
    ConnectionFailed(String),
    #[error("store query failed: {0}")]
    QueryFailed(String),
    #[error("store returned invalid data: {0}")]
    InvalidData(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum FilesystemError {
    #[error("failed to create filesystem event stream: {0}")]
    StreamCreate(String),
    #[error("failed to start filesystem event stream: {0}")]
    StreamStart(String),
    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),
}

#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    #[error("invalid search request: {0}")]
    Invalid(String),
    #[error("failed to process result row: {0}")]
    ResultProcessing(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum IndexingError {
    #[error("indexing root not found: {0}")]
    PathNotFound(PathBuf),
    #[error("batch insert failed: {0}")]
    BatchInsert(String),
    #[error("indexing aborted under memory pressure")]
    MemoryPressure,
    #[error("indexing failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum QueryError {
    #[error("query is empty")]
    Empty,
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unbalanced parentheses")]
    UnbalancedParentheses,
    #[error("invalid operator: {0}")]
    InvalidOperator(String),
    #[error("operator is missing an operand")]
    MissingOperand,
    #[error("tokenization failed: {0}")]
    Tokenization(String),
    #[error("expression nesting too complex")]
    ExpressionTooComplex,
}

impl From<rusqlite::Error> for SeekError {
    fn from(err: rusqlite::Error) -> Self {
        SeekError::Store(StoreError::QueryFailed(err.to_string()))
    }
}

impl From<std::io::Error> for SeekError {
    fn from(err: std::io::Error) -> Self {
        SeekError::Filesystem(FilesystemError::InvalidPath(PathBuf::from(err.to_string())))
    }
}

pub type SeekResult<T> = Result<T, SeekError>;
