// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Static descriptions of entity types and the relationships between them.
//!
//! Entity types are plain data declared as `static` items. Relationships point at their
//! target type by reference, so types may refer to each other in cycles:
//!
//! ```
//! use standin::{EntityType, Relationship};
//!
//! static AUTHOR: EntityType = EntityType {
//!     name: "Author",
//!     table: "author",
//!     primary_key: &["id"],
//!     columns: &["id", "name"],
//!     relationships: &[Relationship::has_many("books", &BOOK, &["author_id"]).with_back_reference("author")],
//! };
//!
//! static BOOK: EntityType = EntityType {
//!     name: "Book",
//!     table: "book",
//!     primary_key: &["id"],
//!     columns: &["id", "author_id", "title"],
//!     relationships: &[Relationship::belongs_to("author", &AUTHOR, &["author_id"])],
//! };
//!
//! assert_eq!(AUTHOR.relationship("books").unwrap().target().name, "Book");
//! ```

use std::{fmt, hash::Hash};

use standin_store::{PrimaryKey, Query, Row};

use crate::{Error, Mode, Result};

/// An entity type: a table, its key and its relationships.
pub struct EntityType {
    /// Unique name of the type; also used in coverage records.
    pub name: &'static str,
    /// Table holding the rows, in both the origin and the cache.
    pub table: &'static str,
    /// Primary-key columns, in key order.
    pub primary_key: &'static [&'static str],
    /// Scalar and foreign-key columns, including the primary-key columns.
    pub columns: &'static [&'static str],
    /// Every relationship of the type.
    pub relationships: &'static [Relationship],
}

impl EntityType {
    /// Looks a relationship up by name.
    #[must_use]
    pub fn relationship(&'static self, name: &str) -> Option<&'static Relationship> {
        self.relationships.iter().find(|relationship| relationship.name == name)
    }

    /// Returns `true` if `column` is one of the declared columns.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    /// Extracts the primary key of a row of this type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingKeyColumn`] if a key column is absent, `NULL` or not keyable.
    pub fn key_of(&self, row: &Row) -> Result<PrimaryKey> {
        match row.key(self.primary_key) {
            Ok(Some(key)) => Ok(key),
            Ok(None) => Err(Error::MissingKeyColumn {
                entity: self.name,
                reason: "primary key column is NULL".to_owned(),
            }),
            Err(error) => Err(Error::MissingKeyColumn {
                entity: self.name,
                reason: error.to_string(),
            }),
        }
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EntityType {}

impl Hash for EntityType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

// Relationships are cyclic, so only names are printed.
impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field(
                "relationships",
                &self.relationships.iter().map(|relationship| relationship.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Whether a relationship resolves to at most one entity or to a list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    /// Zero or one target.
    One,
    /// Any number of targets, ordered by their primary key.
    Many,
}

/// How owner and target rows are joined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Join {
    /// The owner's columns reference the target's primary key.
    Outgoing(&'static [&'static str]),
    /// The target's columns reference the owner's primary key.
    Incoming(&'static [&'static str]),
}

/// A named, lazily resolved link from one entity type to another.
#[derive(Clone, Copy)]
pub struct Relationship {
    name: &'static str,
    target: &'static EntityType,
    cardinality: Cardinality,
    join: Join,
    back_reference: Option<&'static str>,
    mode_cap: Option<Mode>,
    offline_fallback: bool,
}

impl Relationship {
    /// The owner holds a foreign key to exactly one target, which may be absent (`NULL`).
    #[must_use]
    pub const fn belongs_to(name: &'static str, target: &'static EntityType, columns: &'static [&'static str]) -> Self {
        Self::new(name, target, Cardinality::One, Join::Outgoing(columns))
    }

    /// At most one target row holds a foreign key to the owner.
    #[must_use]
    pub const fn has_one(name: &'static str, target: &'static EntityType, columns: &'static [&'static str]) -> Self {
        Self::new(name, target, Cardinality::One, Join::Incoming(columns))
    }

    /// Any number of target rows hold a foreign key to the owner.
    #[must_use]
    pub const fn has_many(name: &'static str, target: &'static EntityType, columns: &'static [&'static str]) -> Self {
        Self::new(name, target, Cardinality::Many, Join::Incoming(columns))
    }

    const fn new(name: &'static str, target: &'static EntityType, cardinality: Cardinality, join: Join) -> Self {
        Self {
            name,
            target,
            cardinality,
            join,
            back_reference: None,
            mode_cap: None,
            offline_fallback: false,
        }
    }

    /// Names the one-valued relationship on the target that points back at the owner.
    ///
    /// Resolving this relationship then fills the back-reference of every target with the
    /// owner, so walking back costs nothing.
    #[must_use]
    pub const fn with_back_reference(mut self, name: &'static str) -> Self {
        self.back_reference = Some(name);
        self
    }

    /// Caps the mode this relationship is resolved in, whatever the session mode.
    #[must_use]
    pub const fn with_mode_cap(mut self, cap: Mode) -> Self {
        self.mode_cap = Some(cap);
        self
    }

    /// Reads an offline miss as "nothing related" instead of failing.
    ///
    /// When the relationship is not cached and cannot be fetched because the access is
    /// offline, it resolves to `None` or an empty list. The empty result is neither stored
    /// on the owner nor recorded as coverage, so a later access fetches the real targets
    /// as soon as the origin is reachable.
    #[must_use]
    pub const fn with_offline_fallback(mut self) -> Self {
        self.offline_fallback = true;
        self
    }

    /// Name of the relationship.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type of the related entities.
    #[must_use]
    pub fn target(&self) -> &'static EntityType {
        self.target
    }

    /// One or many.
    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// The join columns.
    #[must_use]
    pub fn join(&self) -> Join {
        self.join
    }

    /// Name of the back-reference on the target, if any.
    #[must_use]
    pub fn back_reference(&self) -> Option<&'static str> {
        self.back_reference
    }

    /// The mode cap, if any.
    #[must_use]
    pub fn mode_cap(&self) -> Option<Mode> {
        self.mode_cap
    }

    /// Whether offline misses resolve to nothing; see [`Relationship::with_offline_fallback`].
    #[must_use]
    pub fn offline_fallback(&self) -> bool {
        self.offline_fallback
    }

    /// Builds the query selecting the targets of an `Incoming` relationship for one owner.
    pub(crate) fn incoming_query(&self, owner: &EntityType, key: &PrimaryKey) -> Result<Query> {
        let Join::Incoming(columns) = self.join else {
            return Err(self.mismatch(owner, "only incoming joins are queried"));
        };
        if columns.len() != key.len() {
            return Err(self.mismatch(owner, "join columns do not match the owner's primary key"));
        }
        Ok(columns
            .iter()
            .zip(key.parts())
            .fold(Query::table(self.target.table), |query, (column, part)| query.eq(*column, part.clone())))
    }

    fn mismatch(&self, owner: &EntityType, reason: &str) -> Error {
        Error::InvalidRelationship {
            entity: owner.name,
            relationship: self.name,
            reason: reason.to_owned(),
        }
    }
}

impl fmt::Debug for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relationship")
            .field("name", &self.name)
            .field("target", &self.target.name)
            .field("cardinality", &self.cardinality)
            .field("join", &self.join)
            .field("back_reference", &self.back_reference)
            .field("mode_cap", &self.mode_cap)
            .field("offline_fallback", &self.offline_fallback)
            .finish()
    }
}
