//! Store errors

use crate::backend::BackendKind;
use thiserror::Error;

/// Errors returned by every store operation
#[derive(Error, Debug)]
pub enum StoreError {
    /// No backend could be initialized on this host
    #[error("no keyring backend available: {0}")]
    BackendUnavailable(String),

    #[error("key not found: {0}")]
    NotFound(String),

    /// I/O, permission or platform fault during an otherwise valid operation
    #[error("{backend} backend error: {message}")]
    Backend {
        backend: BackendKind,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn backend(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
