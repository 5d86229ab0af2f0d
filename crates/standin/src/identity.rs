// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The per-session identity map.

use std::{collections::HashMap, sync::Weak};

use parking_lot::Mutex;
use standin_store::{PrimaryKey, Row};

use crate::{
    Entity, EntityType, Error, Result,
    flight::{Fetched, Flights},
    session::SessionInner,
};

type Identity = (&'static str, PrimaryKey);

/// Maps (entity type, primary key) to the one live proxy of the session.
///
/// Registration is a synchronous insert-or-get, so however an entity is reached (by key,
/// through a relationship or through a query) every path ends at the same proxy. Entries
/// are never evicted; closing the map drops them all and refuses new ones.
pub(crate) struct IdentityMap {
    session: Weak<SessionInner>,
    entries: Mutex<Option<HashMap<Identity, Entity>>>,
    flights: Flights<Identity, Result<Entity>>,
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("entries", &self.entries.lock().as_ref().map(HashMap::len))
            .field("flights", &self.flights)
            .finish()
    }
}

impl IdentityMap {
    pub fn new(session: Weak<SessionInner>) -> Self {
        Self {
            session,
            entries: Mutex::new(Some(HashMap::new())),
            flights: Flights::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.entries.lock().is_some()
    }

    pub fn get(&self, ty: &EntityType, key: &PrimaryKey) -> Result<Option<Entity>> {
        let entries = self.entries.lock();
        let entries = entries.as_ref().ok_or(Error::NotLive)?;
        Ok(entries.get(&(ty.name, key.clone())).cloned())
    }

    /// Returns the proxy for `(ty, key)`, creating it from `row` if there is none yet.
    ///
    /// An existing proxy wins; `row` is then dropped.
    pub fn intern(&self, ty: &'static EntityType, key: PrimaryKey, row: Row) -> Result<Entity> {
        let mut entries = self.entries.lock();
        let entries = entries.as_mut().ok_or(Error::NotLive)?;
        Ok(entries
            .entry((ty.name, key.clone()))
            .or_insert_with(|| Entity::new(ty, key, row, Weak::clone(&self.session)))
            .clone())
    }

    /// Returns the proxy for `(ty, key)`, running `loader` to produce its row if needed.
    ///
    /// Concurrent calls for the same key run `loader` once and all receive its outcome.
    pub async fn get_or_create<F, Fut>(&self, ty: &'static EntityType, key: PrimaryKey, loader: F) -> Fetched<Result<Entity>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Row>>,
    {
        match self.get(ty, &key) {
            Ok(None) => {}
            resident => {
                return Fetched {
                    value: resident.and_then(|entity| entity.ok_or(Error::NotLive)),
                    joined: false,
                };
            }
        }

        let identity = (ty.name, key.clone());
        self.flights
            .fetch_once(identity, move || async move {
                // A fetch that finished between the check above and now already registered it.
                if let Some(entity) = self.get(ty, &key)? {
                    return Ok(entity);
                }
                let row = loader().await?;
                self.intern(ty, key, row)
            })
            .await
    }

    /// Drops every proxy and refuses new ones.
    pub fn close(&self) {
        let entries = self.entries.lock().take();
        for entity in entries.into_iter().flat_map(HashMap::into_values) {
            entity.clear_slots();
        }
    }
}
