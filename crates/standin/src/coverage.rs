// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coverage records: what the cache is known to hold in full.
//!
//! A coverage record says "this entity, relationship or tagged query was once fetched from
//! the origin and written to the cache". Records live in a reserved cache table and are
//! never deleted.

use std::fmt;

use standin_store::{KeyValue, PrimaryKey, Row};

use crate::{EntityType, Relationship};

/// Reserved cache table holding coverage records.
pub const COVERAGE_TABLE: &str = "_coverage";

/// What a coverage record vouches for.
///
/// The kind is part of the record's key, so a query tag can never stand in for an entity
/// or a relationship of the same name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum CoverageKind {
    Entity,
    Relationship,
    Query,
}

impl CoverageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Relationship => "relationship",
            Self::Query => "query",
        }
    }
}

/// Identifies one coverage record, and the in-flight fetch that would create it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CoverageKey {
    entity: &'static str,
    identity: PrimaryKey,
    kind: CoverageKind,
    field: String,
}

impl CoverageKey {
    pub fn entity(ty: &EntityType, key: &PrimaryKey) -> Self {
        Self {
            entity: ty.name,
            identity: key.clone(),
            kind: CoverageKind::Entity,
            field: String::new(),
        }
    }

    pub fn relationship(owner: &EntityType, key: &PrimaryKey, relationship: &Relationship) -> Self {
        Self {
            entity: owner.name,
            identity: key.clone(),
            kind: CoverageKind::Relationship,
            field: relationship.name().to_owned(),
        }
    }

    pub fn query(ty: &EntityType, tag: &str, identity: &PrimaryKey) -> Self {
        Self {
            entity: ty.name,
            identity: identity.clone(),
            kind: CoverageKind::Query,
            field: tag.to_owned(),
        }
    }

    /// Primary key of the record in [`COVERAGE_TABLE`].
    pub fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::new([
            KeyValue::from(self.entity),
            KeyValue::from(self.identity.encode()),
            KeyValue::from(self.kind.as_str()),
            KeyValue::from(self.field.as_str()),
        ])
    }

    /// The record as stored.
    pub fn row(&self) -> Row {
        Row::new()
            .with("entity", self.entity)
            .with("identity", self.identity.encode())
            .with("kind", self.kind.as_str())
            .with("field", self.field.as_str())
    }
}

impl fmt::Display for CoverageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity, self.identity)?;
        match self.kind {
            CoverageKind::Entity => Ok(()),
            CoverageKind::Relationship => write!(f, ".{}", self.field),
            CoverageKind::Query => write!(f, "[{}]", self.field),
        }
    }
}
