use thiserror::Error;

use crate::bulk::BulkOperationStatus;

/// Errors talking to the store's Admin API.
#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("GraphQL response contained no data")]
    NoData,

    #[error("bulk operation rejected: {}", .0.join("; "))]
    UserErrors(Vec<String>),

    #[error("bulk operation error: {code}")]
    BulkFailed { code: String },

    #[error("bulk operation finished with status {0:?}")]
    NotCompleted(BulkOperationStatus),

    #[error("bulk result line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("bulk result line {line}: unknown parent {parent}")]
    OrphanLine { line: usize, parent: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
