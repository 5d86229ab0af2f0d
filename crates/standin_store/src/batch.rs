// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Write batches: the unit of work committed atomically to a store.

use crate::{PrimaryKey, Row};

/// One insert-or-replace of a row, keyed by primary key.
#[derive(Clone, Debug, PartialEq)]
pub struct Upsert {
    /// Target table.
    pub table: String,
    /// Primary key of the row.
    pub key: PrimaryKey,
    /// Full row contents.
    pub row: Row,
}

/// An ordered list of upserts applied in one transaction.
///
/// Stores apply the upserts in order and either all of them become visible or none do.
///
/// # Examples
///
/// ```
/// use standin_store::{Batch, PrimaryKey, Row};
///
/// let mut batch = Batch::new();
/// batch.upsert("a", PrimaryKey::from(1), Row::new().with("id", 1));
/// assert_eq!(batch.len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    upserts: Vec<Upsert>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an upsert.
    pub fn upsert(&mut self, table: impl Into<String>, key: PrimaryKey, row: Row) -> &mut Self {
        self.upserts.push(Upsert {
            table: table.into(),
            key,
            row,
        });
        self
    }

    /// Number of upserts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.upserts.len()
    }

    /// Returns `true` if there is nothing to commit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty()
    }

    /// The upserts in commit order.
    #[must_use]
    pub fn upserts(&self) -> &[Upsert] {
        &self.upserts
    }
}

impl IntoIterator for Batch {
    type Item = Upsert;
    type IntoIter = std::vec::IntoIter<Upsert>;

    fn into_iter(self) -> Self::IntoIter {
        self.upserts.into_iter()
    }
}

/// What an upsert did to the stored row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row with that key existed.
    Inserted,
    /// An identical row already existed.
    Unchanged,
    /// A different row with the same key was overwritten.
    Replaced,
}

/// Per-upsert outcomes of a committed batch, in batch order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    outcomes: Vec<UpsertOutcome>,
}

impl CommitReport {
    /// Creates a report from outcomes in batch order.
    #[must_use]
    pub fn new(outcomes: Vec<UpsertOutcome>) -> Self {
        Self { outcomes }
    }

    /// Outcomes in batch order.
    #[must_use]
    pub fn outcomes(&self) -> &[UpsertOutcome] {
        &self.outcomes
    }

    /// Number of upserts with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: UpsertOutcome) -> usize {
        self.outcomes.iter().filter(|o| **o == outcome).count()
    }
}
