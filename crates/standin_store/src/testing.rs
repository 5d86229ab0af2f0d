// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock store implementation for testing.
//!
//! [`MockStore`] serves data from a [`MemoryStore`], records every operation it receives and
//! can be told to fail or to slow down, which is what tests of origin outages, duplicate
//! fetch suppression and cancellation need.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{Batch, CommitReport, Error, MemoryStore, PrimaryKey, Query, Result, Row, Store};

/// Recorded store operation with full context.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreOp {
    /// A primary-key lookup.
    Get {
        /// The table that was read.
        table: String,
        /// The key that was looked up.
        key: PrimaryKey,
    },
    /// A query.
    Query(Query),
    /// A committed batch.
    Commit(Batch),
}

impl StoreOp {
    /// Returns `true` for [`StoreOp::Get`] and [`StoreOp::Query`].
    #[must_use]
    pub fn is_read(&self) -> bool {
        !matches!(self, Self::Commit(_))
    }

    /// The table the operation touched, or `None` for commits.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Get { table, .. } => Some(table),
            Self::Query(query) => Some(query.table_name()),
            Self::Commit(_) => None,
        }
    }
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

/// A configurable mock store for testing.
///
/// Clones share data, recorded operations and failure configuration.
///
/// # Examples
///
/// ```
/// use standin_store::{PrimaryKey, Row, Store, testing::{MockStore, StoreOp}};
/// # futures::executor::block_on(async {
///
/// let origin = MockStore::new();
/// origin.data().put("a", PrimaryKey::from(1), Row::new().with("id", 1));
///
/// origin.get("a", &PrimaryKey::from(1)).await?;
///
/// assert_eq!(origin.operations(), vec![StoreOp::Get { table: "a".into(), key: PrimaryKey::from(1) }]);
/// # Ok::<(), standin_store::Error>(())
/// # });
/// ```
///
/// # Failure Injection
///
/// ```
/// use standin_store::{PrimaryKey, Store, testing::{MockStore, StoreOp}};
/// # futures::executor::block_on(async {
///
/// let origin = MockStore::new();
///
/// // Simulate an outage of the whole store.
/// origin.fail_when(|_| true);
/// assert!(origin.get("a", &PrimaryKey::from(1)).await.unwrap_err().is_unreachable());
///
/// // Fail only reads of one table.
/// origin.fail_when(|op| op.table() == Some("b"));
/// assert!(origin.get("b", &PrimaryKey::from(1)).await.is_err());
/// assert!(origin.get("a", &PrimaryKey::from(1)).await.is_ok());
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MockStore {
    data: MemoryStore,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
    latency: Option<Duration>,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .field("latency", &self.latency)
            .finish()
    }
}

impl MockStore {
    /// Creates an empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock store serving the tables of `data`.
    #[must_use]
    pub fn with_data(data: MemoryStore) -> Self {
        Self { data, ..Self::default() }
    }

    /// Delays every operation by `latency` before it runs.
    ///
    /// Requires a tokio runtime with the time driver enabled.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The backing tables, for seeding and inspection. Direct access is not recorded.
    #[must_use]
    pub fn data(&self) -> &MemoryStore {
        &self.data
    }

    /// Sets a predicate that determines which operations fail.
    ///
    /// Failing operations are still recorded and return [`Error::Unreachable`].
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Number of recorded reads (lookups and queries).
    #[must_use]
    pub fn reads(&self) -> usize {
        self.operations.lock().iter().filter(|op| op.is_read()).count()
    }

    /// Number of recorded commits.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.operations.lock().iter().filter(|op| !op.is_read()).count()
    }

    async fn enter(&self, op: StoreOp, what: &str) -> Result<()> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(Error::unreachable(format!("mock: {what} failed")));
        }
        Ok(())
    }
}

impl Store for MockStore {
    async fn get(&self, table: &str, key: &PrimaryKey) -> Result<Option<Row>> {
        let op = StoreOp::Get {
            table: table.to_owned(),
            key: key.clone(),
        };
        self.enter(op, "get").await?;
        Ok(self.data.get_now(table, key))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Row>> {
        self.enter(StoreOp::Query(query.clone()), "query").await?;
        Ok(self.data.query_now(query))
    }

    async fn commit(&self, batch: Batch) -> Result<CommitReport> {
        self.enter(StoreOp::Commit(batch.clone()), "commit").await?;
        Ok(self.data.commit_now(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UpsertOutcome;

    #[tokio::test]
    async fn records_reads_and_commits() {
        let store = MockStore::new();
        store.data().put("a", PrimaryKey::from(1), Row::new().with("id", 1));

        let row = store.get("a", &PrimaryKey::from(1)).await.unwrap();
        assert!(row.is_some());
        let rows = store.query(&Query::table("a")).await.unwrap();
        assert_eq!(rows.len(), 1);

        let mut batch = Batch::new();
        batch.upsert("a", PrimaryKey::from(2), Row::new().with("id", 2));
        let report = store.commit(batch).await.unwrap();
        assert_eq!(report.outcomes(), &[UpsertOutcome::Inserted]);

        assert_eq!(store.reads(), 2);
        assert_eq!(store.commits(), 1);
        store.clear_operations();
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn failed_operations_are_recorded_and_have_no_effect() {
        let store = MockStore::new();
        store.fail_when(|op| matches!(op, StoreOp::Commit(_)));

        let mut batch = Batch::new();
        batch.upsert("a", PrimaryKey::from(1), Row::new());
        let error = store.commit(batch).await.unwrap_err();

        assert!(error.is_unreachable());
        assert_eq!(error.to_string(), "store unreachable: mock: commit failed");
        assert_eq!(store.commits(), 1);
        assert_eq!(store.data().row_count("a"), 0);

        store.clear_failures();
        assert!(store.commit(Batch::new()).await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = MockStore::with_data(MemoryStore::new());
        let clone = store.clone();
        clone.fail_when(|_| true);

        assert!(store.get("a", &PrimaryKey::from(1)).await.is_err());
        assert_eq!(clone.reads(), 1);
    }

    #[tokio::test]
    async fn latency_delays_operations() {
        let store = MockStore::new().with_latency(Duration::from_millis(20));
        let started = std::time::Instant::now();
        store.get("a", &PrimaryKey::from(1)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn op_tables() {
        assert_eq!(StoreOp::Query(Query::table("b")).table(), Some("b"));
        assert_eq!(StoreOp::Commit(Batch::new()).table(), None);
        assert!(!StoreOp::Commit(Batch::new()).is_read());
    }
}
