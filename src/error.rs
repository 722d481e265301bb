use crate::pipeline::Stage;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a dataset line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    TokenCount(usize),
    EmptyIdentifier,
    InvalidUtf8,
    BadTimestamp(String),
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailure::TokenCount(n) => write!(f, "expected 3 tokens, found {n}"),
            ParseFailure::EmptyIdentifier => write!(f, "empty identifier"),
            ParseFailure::InvalidUtf8 => write!(f, "line is not valid UTF-8"),
            ParseFailure::BadTimestamp(raw) => {
                write!(f, "timestamp {raw:?} is not a non-negative integer")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot connect to graph store at {location}")]
    Connection {
        location: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("constraint violation in {operation}: {message}")]
    ConstraintViolation {
        operation: &'static str,
        message: String,
    },
    #[error("{field} {value} in {operation} exceeds the store's integer range")]
    OutOfRange {
        operation: &'static str,
        field: &'static str,
        value: u64,
    },
    #[error("store operation {operation} failed")]
    Query {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    /// Classifies a driver error raised while running `operation`.
    pub fn sql(operation: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
        move |err| match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation {
                    operation,
                    message: message.unwrap_or_else(|| code.to_string()),
                }
            }
            source => StoreError::Query { operation, source },
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("line {line}: {reason}: {content:?}")]
    Parse {
        line: u64,
        content: String,
        reason: ParseFailure,
    },
    #[error("identifiers {first:?} and {second:?} both map to username {username:?}")]
    DuplicateEntityConflict {
        first: String,
        second: String,
        username: String,
    },
    #[error("staging file {}: {reason}", .path.display())]
    Staging { path: PathBuf, reason: String },
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An import run that stopped in `stage`.
#[derive(Debug, Error)]
#[error("import failed in stage {stage}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ImportError,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
    #[error("username already exists")]
    UsernameTaken,
    #[error("email already registered")]
    EmailTaken,
    #[error("no imported user with id {0}")]
    UnknownDatasetUser(String),
    #[error("imported user {0} already has credentials")]
    AlreadyClaimed(String),
    #[error("username not found")]
    UnknownUser,
    #[error("incorrect password")]
    WrongPassword,
    #[error("account has no password yet, register with its dataset id first")]
    NoCredentials,
    #[error("no fields to update")]
    NothingToUpdate,
    #[error("password hashing failed")]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("cannot follow yourself")]
    SelfFollow,
    #[error("cannot unfollow yourself")]
    SelfUnfollow,
    #[error("user {0} not found")]
    UnknownUser(String),
    #[error("already following {0}")]
    AlreadyFollowing(String),
    #[error("not following {0}")]
    NotFollowing(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
