// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The store handle consumed by the caching core.
//!
//! [`Store`] is the whole surface the core needs from a relational backend: primary-key
//! lookups, arbitrary queries, and atomic commits of write batches. Table definitions,
//! SQL generation and connection handling stay with the implementation.

use std::{fmt::Debug, sync::Arc};

use crate::{Batch, CommitReport, PrimaryKey, Query, Result, Row};

/// A handle to one relational store, either the origin or the cache.
///
/// Implementations must be safe to share between tasks. Every method is a suspension
/// point for the caller.
#[dynosaur::dynosaur(pub(crate) DynStore = dyn(box) Store, bridge(none))]
pub trait Store: Send + Sync {
    /// Looks a row up by primary key.
    fn get(&self, table: &str, key: &PrimaryKey) -> impl Future<Output = Result<Option<Row>>> + Send;

    /// Runs a query and returns the matching rows.
    ///
    /// Rows come back in primary-key order unless the query sorts them.
    fn query(&self, query: &Query) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Applies every upsert of the batch in one transaction.
    ///
    /// Upserts are keyed by primary key: writing an identical row twice is a no-op that
    /// reports [`UpsertOutcome::Unchanged`](crate::UpsertOutcome::Unchanged).
    fn commit(&self, batch: Batch) -> impl Future<Output = Result<CommitReport>> + Send;
}

/// A clonable, type-erased store handle.
///
/// Sessions hold their origin and cache through this type so that proxies and sessions
/// do not carry the concrete store types in their signatures.
///
/// # Examples
///
/// ```
/// use standin_store::{MemoryStore, SharedStore};
///
/// let store = SharedStore::new(MemoryStore::new());
/// let clone = store.clone();
/// # drop(clone);
/// ```
pub struct SharedStore(Arc<DynStore<'static>>);

impl SharedStore {
    /// Erases the concrete type of a store.
    pub fn new<S>(store: S) -> Self
    where
        S: Store + 'static,
    {
        Self(DynStore::new_arc(store))
    }
}

impl Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore").finish()
    }
}

impl Clone for SharedStore {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Store for SharedStore {
    async fn get(&self, table: &str, key: &PrimaryKey) -> Result<Option<Row>> {
        self.0.get(table, key).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Row>> {
        self.0.query(query).await
    }

    async fn commit(&self, batch: Batch) -> Result<CommitReport> {
        self.0.commit(batch).await
    }
}
