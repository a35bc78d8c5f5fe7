// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

pub type CoachResult<T> = std::result::Result<T, CoachError>;

#[derive(Debug, Error)]
pub enum CoachError {
    /// A required field was missing or malformed; nothing was written.
    #[error("{0}")]
    Validation(String),
    /// The record is absent or belongs to another owner.
    #[error("{0}")]
    NotFound(String),
    #[error("storage unavailable: {0:#}")]
    StorageUnavailable(#[source] anyhow::Error),
    #[error("storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
    /// The AI step produced nothing that can be stored.
    #[error("{0}")]
    Generation(String),
}

impl CoachError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Generation(_) => ErrorKind::Generation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    StorageUnavailable,
    Storage,
    Generation,
}

/// Attaches a label to a low-level failure and files it under [`CoachError::Storage`].
pub trait StorageContext<T> {
    fn storage(self, what: &'static str) -> CoachResult<T>;

    fn storage_with<F>(self, what: F) -> CoachResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> StorageContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn storage(self, what: &'static str) -> CoachResult<T> {
        self.map_err(|error| CoachError::Storage(anyhow::Error::new(error).context(what)))
    }

    fn storage_with<F>(self, what: F) -> CoachResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|error| CoachError::Storage(anyhow::Error::new(error).context(what())))
    }
}
