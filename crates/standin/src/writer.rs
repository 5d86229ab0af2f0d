// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mirroring of origin rows into the cache store.

use standin_store::{Batch, PrimaryKey, Row, SharedStore, Store, UpsertOutcome};

use crate::{
    EntityType, Error, Relationship, Result, Side,
    coverage::{COVERAGE_TABLE, CoverageKey},
};

/// What one persist call did to the cache.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PersistReport {
    /// Rows that were inserted or replaced.
    pub written: usize,
    /// Rows whose cached version differed from the origin version.
    pub diverged: Vec<(&'static str, PrimaryKey)>,
}

/// Writes origin rows, then their coverage records, to the cache in one batch.
///
/// Every write is an upsert keyed by primary key, so persisting the same rows twice
/// leaves the cache unchanged.
#[derive(Clone, Debug)]
pub(crate) struct CacheWriter {
    cache: SharedStore,
}

impl CacheWriter {
    pub fn new(cache: SharedStore) -> Self {
        Self { cache }
    }

    /// Persists one entity row and its entity coverage.
    pub async fn persist(&self, ty: &'static EntityType, key: &PrimaryKey, row: &Row) -> Result<PersistReport> {
        self.write(ty, std::slice::from_ref(row), CoverageKey::entity(ty, key)).await
    }

    /// Persists the targets of a relationship, their entity coverage and the relationship coverage.
    pub async fn persist_relationship(
        &self,
        owner: &'static EntityType,
        key: &PrimaryKey,
        relationship: &'static Relationship,
        rows: &[Row],
    ) -> Result<PersistReport> {
        let coverage = CoverageKey::relationship(owner, key, relationship);
        self.write(relationship.target(), rows, coverage).await
    }

    /// Persists the rows of a tagged query, their entity coverage and the query coverage.
    pub async fn persist_query(&self, ty: &'static EntityType, tag: &str, identity: &PrimaryKey, rows: &[Row]) -> Result<PersistReport> {
        self.write(ty, rows, CoverageKey::query(ty, tag, identity)).await
    }

    async fn write(&self, ty: &'static EntityType, rows: &[Row], coverage: CoverageKey) -> Result<PersistReport> {
        let mut batch = Batch::new();
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let key = ty.key_of(row)?;
            batch.upsert(ty.table, key.clone(), row.clone());
            keys.push(key);
        }

        // Coverage goes last, so a partially applied batch never claims rows it lacks.
        for key in &keys {
            let entity = CoverageKey::entity(ty, key);
            if entity != coverage {
                batch.upsert(COVERAGE_TABLE, entity.primary_key(), entity.row());
            }
        }
        batch.upsert(COVERAGE_TABLE, coverage.primary_key(), coverage.row());

        let commit = self.cache.commit(batch).await.map_err(|error| Error::from_store(Side::Cache, error))?;

        let mut report = PersistReport::default();
        for (key, outcome) in keys.into_iter().zip(commit.outcomes()) {
            match outcome {
                UpsertOutcome::Inserted => report.written += 1,
                UpsertOutcome::Unchanged => {}
                UpsertOutcome::Replaced => {
                    report.written += 1;
                    report.diverged.push((ty.name, key));
                }
            }
        }
        Ok(report)
    }
}
