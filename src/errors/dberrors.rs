use std::fmt;
use thiserror::Error;

use crate::datalayer::db_ops::constants::ConnectionState;

/// Where a backend failure originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The server was never reached or the socket broke (refused, reset, TLS, pool timeout).
    Transport,
    /// The server answered with an error, `code` holds its SQLSTATE.
    Database,
    Other,
}

/// Driver-neutral failure reported by a pool driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub code: Option<String>,
    pub message: String,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for BackendError {}

impl BackendError {
    pub fn transport(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Transport,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Database,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Other,
            code: None,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

/// Errors surfaced by the resilient connection manager
#[derive(Debug, Clone, Error)]
pub enum DbError {
    #[error("database not connected (state: {state})")]
    NotConnected { state: ConnectionState },

    #[error("database connection error: {0}")]
    Connection(BackendError),

    #[error("database statement error: {0}")]
    Statement(BackendError),

    #[error("database unreachable after {attempts} connection attempts: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        last_error: BackendError,
    },

    #[error("database connection manager is closed")]
    Closed,
}

impl DbError {
    /// True for failures that mean the database itself is unavailable
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, DbError::Statement(_))
    }

    /// Backend failure behind this error, if any
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            DbError::Connection(err) | DbError::Statement(err) => Some(err),
            DbError::ExhaustedRetries { last_error, .. } => Some(last_error),
            DbError::NotConnected { .. } | DbError::Closed => None,
        }
    }
}
