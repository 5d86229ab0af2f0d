// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Entity proxies.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use standin_store::{PrimaryKey, Row, Value};

use crate::{Cardinality, EntityType, Error, Result, session::SessionInner};

static NULL: Value = Value::Null;

/// The resolved value of a relationship.
#[derive(Clone, Debug)]
pub enum Related {
    /// A one-valued relationship; `None` if there is no target.
    One(Option<Entity>),
    /// A many-valued relationship, ordered by the targets' primary keys.
    Many(Arc<[Entity]>),
}

impl Related {
    pub(crate) fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::One => Self::One(None),
            Cardinality::Many => Self::Many(Vec::new().into()),
        }
    }

    /// The related entities as a slice, whatever the cardinality.
    #[must_use]
    pub fn as_slice(&self) -> &[Entity] {
        match self {
            Self::One(None) => &[],
            Self::One(Some(entity)) => std::slice::from_ref(entity),
            Self::Many(entities) => entities,
        }
    }
}

/// The single in-session object standing for one row of one entity type.
///
/// Scalar columns are available immediately; relationships are resolved on first access
/// and remembered for the rest of the session. Two `Entity` values are equal only if they
/// are the same proxy, which within one session is the same as having the same type and
/// key.
///
/// Clones are cheap and refer to the same proxy. Once the session is closed every access
/// fails with [`Error::NotLive`].
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

struct EntityInner {
    ty: &'static EntityType,
    key: PrimaryKey,
    row: Row,
    slots: Mutex<HashMap<&'static str, Related>>,
    session: Weak<SessionInner>,
}

impl Entity {
    pub(crate) fn new(ty: &'static EntityType, key: PrimaryKey, row: Row, session: Weak<SessionInner>) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                ty,
                key,
                row,
                slots: Mutex::new(HashMap::new()),
                session,
            }),
        }
    }

    /// The type of the entity.
    #[must_use]
    pub fn entity_type(&self) -> &'static EntityType {
        self.inner.ty
    }

    /// The primary key of the entity.
    #[must_use]
    pub fn key(&self) -> &PrimaryKey {
        &self.inner.key
    }

    /// Returns the value of a column. Declared columns missing from the row read as `NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLive`] after the session closed and [`Error::UnknownColumn`] for
    /// undeclared columns.
    pub fn column(&self, name: &str) -> Result<&Value> {
        self.ensure_live()?;
        if !self.inner.ty.has_column(name) {
            return Err(Error::UnknownColumn {
                entity: self.inner.ty.name,
                column: name.to_owned(),
            });
        }
        Ok(self.inner.row.get(name).unwrap_or(&NULL))
    }

    /// The full row the entity was materialized from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLive`] after the session closed.
    pub fn row(&self) -> Result<&Row> {
        self.ensure_live()?;
        Ok(&self.inner.row)
    }

    /// Resolves a relationship, fetching it on first access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRelationship`] for undeclared names, [`Error::NotLive`] after
    /// the session closed, and whatever resolving the relationship failed with otherwise.
    pub async fn related(&self, name: &str) -> Result<Related> {
        let session = self.session()?;
        let relationship = self.inner.ty.relationship(name).ok_or_else(|| Error::UnknownRelationship {
            entity: self.inner.ty.name,
            relationship: name.to_owned(),
        })?;
        if let Some(related) = self.slot(relationship.name()) {
            return Ok(related);
        }
        session.related(self, relationship).await
    }

    /// Resolves a one-valued relationship.
    ///
    /// # Errors
    ///
    /// As [`Entity::related`], plus [`Error::Cardinality`] for many-valued relationships.
    pub async fn one(&self, name: &str) -> Result<Option<Self>> {
        match self.related(name).await? {
            Related::One(entity) => Ok(entity),
            Related::Many(_) => Err(self.cardinality_error(name, Cardinality::One)),
        }
    }

    /// Resolves a many-valued relationship.
    ///
    /// # Errors
    ///
    /// As [`Entity::related`], plus [`Error::Cardinality`] for one-valued relationships.
    pub async fn many(&self, name: &str) -> Result<Arc<[Self]>> {
        match self.related(name).await? {
            Related::Many(entities) => Ok(entities),
            Related::One(_) => Err(self.cardinality_error(name, Cardinality::Many)),
        }
    }

    /// Returns `true` if both values are the same proxy.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` while the owning session is open.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.ensure_live().is_ok()
    }

    pub(crate) fn data(&self) -> &Row {
        &self.inner.row
    }

    pub(crate) fn slot(&self, name: &str) -> Option<Related> {
        self.inner.slots.lock().get(name).cloned()
    }

    /// Stores a resolved relationship unless one is already stored; returns the stored value.
    pub(crate) fn fill(&self, name: &'static str, related: Related) -> Related {
        self.inner.slots.lock().entry(name).or_insert(related).clone()
    }

    pub(crate) fn clear_slots(&self) {
        // Taken out first so the nested drops do not run under the lock.
        let slots = std::mem::take(&mut *self.inner.slots.lock());
        drop(slots);
    }

    fn session(&self) -> Result<Arc<SessionInner>> {
        self.inner.session.upgrade().filter(|session| session.is_live()).ok_or(Error::NotLive)
    }

    fn ensure_live(&self) -> Result<()> {
        self.session().map(drop)
    }

    fn cardinality_error(&self, name: &str, expected: Cardinality) -> Error {
        let relationship = self.inner.ty.relationship(name).map_or("", |relationship| relationship.name());
        Error::Cardinality {
            entity: self.inner.ty.name,
            relationship,
            expected: match expected {
                Cardinality::One => "one",
                Cardinality::Many => "many",
            },
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.inner.ty.name, self.inner.key)
    }
}
