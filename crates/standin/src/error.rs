// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for session operations.

use std::{fmt, sync::Arc};

use standin_store::PrimaryKey;
use thiserror::Error;

/// Which of the two stores of a session an operation ran against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// The authoritative, possibly unreachable store.
    Origin,
    /// The local store mirroring the origin.
    Cache,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Origin => f.write_str("origin"),
            Self::Cache => f.write_str("cache"),
        }
    }
}

/// An error returned by a session, an entity or a relationship access.
///
/// Errors are cheap to clone: every caller waiting on the same fetch receives a clone of
/// the one error the fetch produced.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The session is offline and the data was never cached.
    #[error("{target} is not cached and the session is offline")]
    OfflineMiss {
        /// What was requested, e.g. `A(1).bs`.
        target: String,
    },

    /// The origin could not be reached.
    #[error("origin store is unreachable")]
    Connectivity {
        /// The store failure.
        source: Arc<standin_store::Error>,
    },

    /// A store failed for a reason other than reachability.
    #[error("{side} store failed")]
    Store {
        /// The failing store.
        side: Side,
        /// The store failure.
        source: Arc<standin_store::Error>,
    },

    /// No row with the requested key exists.
    #[error("{entity}({key}) does not exist")]
    NotFound {
        /// Name of the entity type.
        entity: &'static str,
        /// The requested key.
        key: PrimaryKey,
    },

    /// The session was closed.
    #[error("the session has been closed")]
    NotLive,

    /// The origin was needed but the session has none.
    #[error("the session has no origin store")]
    MissingOrigin,

    /// The entity type has no such column.
    #[error("{entity} has no column {column:?}")]
    UnknownColumn {
        /// Name of the entity type.
        entity: &'static str,
        /// The requested column.
        column: String,
    },

    /// The entity type has no such relationship.
    #[error("{entity} has no relationship {relationship:?}")]
    UnknownRelationship {
        /// Name of the entity type.
        entity: &'static str,
        /// The requested relationship.
        relationship: String,
    },

    /// A row lacks a usable primary or foreign key.
    #[error("{entity} row has no usable key: {reason}")]
    MissingKeyColumn {
        /// Name of the entity type.
        entity: &'static str,
        /// What is wrong with the key columns.
        reason: String,
    },

    /// A relationship declaration does not fit the data it is applied to.
    #[error("relationship {entity}.{relationship} is invalid: {reason}")]
    InvalidRelationship {
        /// Name of the owning entity type.
        entity: &'static str,
        /// Name of the relationship.
        relationship: &'static str,
        /// What is wrong.
        reason: String,
    },

    /// A one-valued accessor was used on a many-valued relationship, or vice versa.
    #[error("relationship {entity}.{relationship} is not {expected}-valued")]
    Cardinality {
        /// Name of the owning entity type.
        entity: &'static str,
        /// Name of the relationship.
        relationship: &'static str,
        /// `"one"` or `"many"`.
        expected: &'static str,
    },
}

impl Error {
    /// Classifies a store failure on the given side.
    ///
    /// An unreachable origin is a [`Error::Connectivity`] failure; everything else is
    /// reported as [`Error::Store`].
    pub(crate) fn from_store(side: Side, error: standin_store::Error) -> Self {
        match side {
            Side::Origin if error.is_unreachable() => Self::Connectivity { source: Arc::new(error) },
            side => Self::Store {
                side,
                source: Arc::new(error),
            },
        }
    }

    /// Returns `true` for [`Error::OfflineMiss`].
    #[must_use]
    pub fn is_offline_miss(&self) -> bool {
        matches!(self, Self::OfflineMiss { .. })
    }

    /// Returns `true` for [`Error::Connectivity`].
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Returns `true` for [`Error::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`Error::NotLive`].
    #[must_use]
    pub fn is_not_live(&self) -> bool {
        matches!(self, Self::NotLive)
    }

    /// Returns `true` for failures of a store, as opposed to misses and misuse.
    #[must_use]
    pub(crate) fn is_store_failure(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Store { .. })
    }
}

/// A specialized `Result` for session operations.
pub type Result<T> = std::result::Result<T, Error>;
