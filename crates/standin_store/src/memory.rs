// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory relational store.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;

use crate::{Batch, CommitReport, PrimaryKey, Query, Result, Row, Store, UpsertOutcome};

type Table = BTreeMap<PrimaryKey, Row>;

/// A store that keeps every table in process memory.
///
/// This is the default cache store of a session and a convenient origin for tests.
/// Clones share the same tables, so a cache can be handed to one session after another.
/// Tables come into existence on first write; reading an unknown table yields no rows.
///
/// # Examples
///
/// ```
/// use standin_store::{MemoryStore, PrimaryKey, Row, Store};
/// # futures::executor::block_on(async {
///
/// let store = MemoryStore::new();
/// store.put("a", PrimaryKey::from(1), Row::new().with("id", 1).with("name", "a1"));
///
/// let row = store.get("a", &PrimaryKey::from(1)).await?;
/// assert_eq!(row.unwrap().get("name").unwrap().as_text(), Some("a1"));
/// # Ok::<(), standin_store::Error>(())
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a row directly, bypassing batches. Returns the replaced row, if any.
    pub fn put(&self, table: impl Into<String>, key: PrimaryKey, row: Row) -> Option<Row> {
        self.tables.write().entry(table.into()).or_default().insert(key, row)
    }

    /// Removes a row directly. Returns the removed row, if any.
    pub fn remove(&self, table: &str, key: &PrimaryKey) -> Option<Row> {
        self.tables.write().get_mut(table).and_then(|rows| rows.remove(key))
    }

    /// Number of rows in a table.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Returns `true` if the table holds a row with that key.
    #[must_use]
    pub fn contains(&self, table: &str, key: &PrimaryKey) -> bool {
        self.tables.read().get(table).is_some_and(|rows| rows.contains_key(key))
    }

    /// Names of all tables that hold or have held rows, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn get_now(&self, table: &str, key: &PrimaryKey) -> Option<Row> {
        self.tables.read().get(table).and_then(|rows| rows.get(key)).cloned()
    }

    pub(crate) fn query_now(&self, query: &Query) -> Vec<Row> {
        let matching = self
            .tables
            .read()
            .get(query.table_name())
            .map(|rows| rows.values().filter(|row| query.matches(row)).cloned().collect())
            .unwrap_or_default();
        query.finish(matching)
    }

    pub(crate) fn commit_now(&self, batch: Batch) -> CommitReport {
        let mut tables = self.tables.write();
        let outcomes = batch
            .into_iter()
            .map(|upsert| {
                let rows = tables.entry(upsert.table).or_default();
                match rows.insert(upsert.key, upsert.row.clone()) {
                    None => UpsertOutcome::Inserted,
                    Some(previous) if previous.same_content(&upsert.row) => UpsertOutcome::Unchanged,
                    Some(_) => UpsertOutcome::Replaced,
                }
            })
            .collect();
        CommitReport::new(outcomes)
    }
}

impl Store for MemoryStore {
    async fn get(&self, table: &str, key: &PrimaryKey) -> Result<Option<Row>> {
        Ok(self.get_now(table, key))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Row>> {
        Ok(self.query_now(query))
    }

    async fn commit(&self, batch: Batch) -> Result<CommitReport> {
        Ok(self.commit_now(batch))
    }
}
