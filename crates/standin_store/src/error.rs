// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for store operations.

use thiserror::Error;

/// An error returned by a store.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The store could not be reached, e.g. the connection was refused or dropped.
    ///
    /// The caching core reports this as a connectivity failure when it happens on the origin.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// We are forwarding an error of unknown type from the underlying driver.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Creates an [`Error::Unreachable`].
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable(reason.into())
    }

    /// Wraps any driver error.
    pub fn other(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(cause.into())
    }

    /// Returns `true` for [`Error::Unreachable`].
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// A specialized `Result` for store operations.
pub type Result<T> = std::result::Result<T, Error>;
