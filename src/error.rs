//! Error type shared by tree construction and every renderer.

use thiserror::Error;

/// The single failure kind raised while building or rendering a card query.
///
/// Construction and traversal abort on the first problem; the message is
/// meant to be shown to the person who wrote the query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryError {
    pub message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
