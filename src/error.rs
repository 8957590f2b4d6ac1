//! Error taxonomy for the stream engine.
//!
//! This mirrors the small, closed set of failure states the engine can be in
//! (see `State`) while still carrying a human-readable message and, where
//! known, the record/field the failure occurred on -- these are surfaced to
//! whatever sink the caller wires up (a log target, a UI, a test assertion).

use thiserror::Error;

/// The coarse state a failure represents, independent of its message.
///
/// `FIELD_NOT_FOUND` and `UNEXPECTED_EOF` (at the end of a record's row
/// loop) are the two cases the engine itself recovers from internally; every
/// other state propagates to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ok,
    Failure,
    FileNotFound,
    UnexpectedEof,
    ReadTypesDontMatch,
    MismatchTypes,
    FieldNotFound,
    UnexpectedRecord,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{message}")]
    Failure { message: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("unexpected end of file: {message}")]
    UnexpectedEof { message: String },

    #[error("record '{record}' field '{field}': caller's types don't match the column's declared types")]
    ReadTypesDontMatch { record: String, field: String },

    #[error("record '{record}' field '{field}': value literal does not match the declared type")]
    MismatchTypes { record: String, field: String },

    #[error("record '{record}' field '{field}' not found in this record")]
    FieldNotFound { record: String, field: String },

    #[error("expected record '{expected}', found '{found}'")]
    UnexpectedRecord { expected: String, found: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn state(&self) -> State {
        match self {
            Error::Failure { .. } => State::Failure,
            Error::FileNotFound { .. } => State::FileNotFound,
            Error::UnexpectedEof { .. } => State::UnexpectedEof,
            Error::ReadTypesDontMatch { .. } => State::ReadTypesDontMatch,
            Error::MismatchTypes { .. } => State::MismatchTypes,
            Error::FieldNotFound { .. } => State::FieldNotFound,
            Error::UnexpectedRecord { .. } => State::UnexpectedRecord,
            Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => State::UnexpectedEof,
            Error::Io(_) => State::Failure,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.state() == State::UnexpectedEof
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Error::Failure { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
