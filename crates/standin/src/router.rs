// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Decides, per access, between the cache, the origin and an offline miss.

use standin_store::{PrimaryKey, Query, Row, SharedStore, Store};

use crate::{
    EntityType, Error, Mode, Relationship, Result, Side,
    coverage::{COVERAGE_TABLE, CoverageKey},
    telemetry::{Activity, Telemetry},
    writer::{CacheWriter, PersistReport},
};

/// One access to resolve: what to read and which coverage record vouches for it.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Lookup<'a> {
    /// An entity by primary key.
    Entity { ty: &'static EntityType, key: &'a PrimaryKey },
    /// The targets of an incoming relationship of one owner.
    Relationship {
        owner: &'static EntityType,
        key: &'a PrimaryKey,
        relationship: &'static Relationship,
        query: &'a Query,
    },
    /// The rows of a tagged, caller-supplied query.
    Query {
        ty: &'static EntityType,
        tag: &'a str,
        identity: &'a PrimaryKey,
        query: &'a Query,
    },
}

impl Lookup<'_> {
    pub fn coverage(&self) -> CoverageKey {
        match *self {
            Self::Entity { ty, key } => CoverageKey::entity(ty, key),
            Self::Relationship { owner, key, relationship, .. } => CoverageKey::relationship(owner, key, relationship),
            Self::Query { ty, tag, identity, .. } => CoverageKey::query(ty, tag, identity),
        }
    }

    async fn read(&self, side: Side, store: &SharedStore) -> Result<Vec<Row>> {
        let rows = match *self {
            Self::Entity { ty, key } => store.get(ty.table, key).await.map(|row| row.into_iter().collect()),
            Self::Relationship { query, .. } | Self::Query { query, .. } => store.query(query).await,
        };
        let rows = rows.map_err(|error| Error::from_store(side, error))?;

        match *self {
            Self::Entity { ty, key } if rows.is_empty() => Err(Error::NotFound {
                entity: ty.name,
                key: key.clone(),
            }),
            _ => Ok(rows),
        }
    }
}

/// Routes lookups to the cache or the origin according to coverage and mode.
#[derive(Clone, Debug)]
pub(crate) struct QueryRouter {
    origin: Option<SharedStore>,
    cache: SharedStore,
    writer: CacheWriter,
    telemetry: Telemetry,
}

impl QueryRouter {
    pub fn new(origin: Option<SharedStore>, cache: SharedStore, telemetry: Telemetry) -> Self {
        Self {
            origin,
            writer: CacheWriter::new(cache.clone()),
            cache,
            telemetry,
        }
    }

    /// Resolves a lookup to rows.
    ///
    /// - Below [`Mode::Freshen`], covered lookups are served from the cache.
    /// - In [`Mode::Offline`], uncovered lookups fail with [`Error::OfflineMiss`].
    /// - Everything else is read from the origin and written through to the cache.
    pub async fn resolve(&self, lookup: &Lookup<'_>, mode: Mode) -> Result<Vec<Row>> {
        let coverage = lookup.coverage();
        let result = self.route(lookup, &coverage, mode).await;
        match &result {
            Err(error) if error.is_store_failure() => self.telemetry.record_error(&coverage, error),
            _ => {}
        }
        result
    }

    /// Runs a query against one store, bypassing coverage and the identity map.
    pub async fn raw(&self, side: Side, query: &Query) -> Result<Vec<Row>> {
        let store = match side {
            Side::Origin => self.origin.as_ref().ok_or(Error::MissingOrigin)?,
            Side::Cache => &self.cache,
        };
        store.query(query).await.map_err(|error| Error::from_store(side, error))
    }

    /// Probes the cache store, surfacing a broken cache before the first access.
    pub async fn probe(&self) -> Result<()> {
        self.raw(Side::Cache, &Query::table(COVERAGE_TABLE).limit(1)).await.map(drop)
    }

    async fn route(&self, lookup: &Lookup<'_>, coverage: &CoverageKey, mode: Mode) -> Result<Vec<Row>> {
        if mode < Mode::Freshen && self.is_covered(coverage).await? {
            let rows = lookup.read(Side::Cache, &self.cache).await?;
            self.telemetry.record(Activity::Hit, coverage);
            return Ok(rows);
        }

        if mode == Mode::Offline {
            self.telemetry.record(Activity::OfflineMiss, coverage);
            return Err(Error::OfflineMiss {
                target: coverage.to_string(),
            });
        }

        self.telemetry.record(Activity::Miss, coverage);
        let origin = self.origin.as_ref().ok_or(Error::MissingOrigin)?;
        let rows = lookup.read(Side::Origin, origin).await?;

        let report = match *lookup {
            Lookup::Entity { ty, key } => {
                // `read` guarantees a row for entity lookups.
                let Some(row) = rows.first() else {
                    return Err(Error::NotFound {
                        entity: ty.name,
                        key: key.clone(),
                    });
                };
                self.writer.persist(ty, key, row).await?
            }
            Lookup::Relationship {
                owner, key, relationship, ..
            } => self.writer.persist_relationship(owner, key, relationship, &rows).await?,
            Lookup::Query { ty, tag, identity, .. } => self.writer.persist_query(ty, tag, identity, &rows).await?,
        };
        self.record_persisted(coverage, &report);

        Ok(rows)
    }

    async fn is_covered(&self, coverage: &CoverageKey) -> Result<bool> {
        self.cache
            .get(COVERAGE_TABLE, &coverage.primary_key())
            .await
            .map(|record| record.is_some())
            .map_err(|error| Error::from_store(Side::Cache, error))
    }

    fn record_persisted(&self, coverage: &CoverageKey, report: &PersistReport) {
        for (entity, key) in &report.diverged {
            self.telemetry.record(Activity::Diverged, &format_args!("{entity}({key})"));
        }
        self.telemetry.record_fetched(coverage, report.written);
    }
}

#[cfg(test)]
mod tests {
    use standin_store::{
        MemoryStore,
        testing::{MockStore, StoreOp},
    };

    use super::*;

    static A: EntityType = EntityType {
        name: "A",
        table: "a",
        primary_key: &["id"],
        columns: &["id", "name"],
        relationships: &[Relationship::has_many("bs", &B, &["a_id"])],
    };

    static B: EntityType = EntityType {
        name: "B",
        table: "b",
        primary_key: &["id"],
        columns: &["id", "a_id"],
        relationships: &[],
    };

    struct Fixture {
        origin: MockStore,
        cache: MockStore,
        router: QueryRouter,
    }

    fn fixture() -> Fixture {
        let origin = MockStore::new();
        origin.data().put("a", PrimaryKey::from(1), Row::new().with("id", 1).with("name", "a1"));
        for id in 1..=3 {
            origin.data().put("b", PrimaryKey::from(id), Row::new().with("id", id).with("a_id", 1));
        }
        let cache = MockStore::new();
        let router = QueryRouter::new(
            Some(SharedStore::new(origin.clone())),
            SharedStore::new(cache.clone()),
            Telemetry::new("test"),
        );
        Fixture { origin, cache, router }
    }

    fn a(key: &PrimaryKey) -> Lookup<'_> {
        Lookup::Entity { ty: &A, key }
    }

    #[tokio::test]
    async fn online_fetches_once_then_hits_cache() {
        let f = fixture();
        let key = PrimaryKey::from(1);

        let first = f.router.resolve(&a(&key), Mode::Online).await.unwrap();
        let second = f.router.resolve(&a(&key), Mode::Online).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.origin.reads(), 1);
        assert!(f.cache.data().contains(COVERAGE_TABLE, &a(&key).coverage().primary_key()));
    }

    #[tokio::test]
    async fn offline_miss_never_touches_origin() {
        let f = fixture();

        let error = f.router.resolve(&a(&PrimaryKey::from(1)), Mode::Offline).await.unwrap_err();

        assert!(error.is_offline_miss());
        assert_eq!(error.to_string(), "A(1) is not cached and the session is offline");
        assert!(f.origin.operations().is_empty());
    }

    #[tokio::test]
    async fn freshen_always_reads_origin() {
        let f = fixture();
        let key = PrimaryKey::from(1);
        f.router.resolve(&a(&key), Mode::Online).await.unwrap();
        f.origin.data().put("a", key.clone(), Row::new().with("id", 1).with("name", "renamed"));

        let rows = f.router.resolve(&a(&key), Mode::Freshen).await.unwrap();

        assert_eq!(rows[0].get("name").unwrap().as_text(), Some("renamed"));
        assert_eq!(f.origin.reads(), 2);
        let cached = f.cache.data().get("a", &key).await.unwrap().unwrap();
        assert_eq!(cached.get("name").unwrap().as_text(), Some("renamed"));
    }

    #[tokio::test]
    async fn relationship_rows_are_cached_with_coverage() {
        let f = fixture();
        let key = PrimaryKey::from(1);
        let relationship = &A.relationships[0];
        let query = relationship.incoming_query(&A, &key).unwrap();
        let lookup = Lookup::Relationship {
            owner: &A,
            key: &key,
            relationship,
            query: &query,
        };

        let rows = f.router.resolve(&lookup, Mode::Online).await.unwrap();
        assert_eq!(rows.len(), 3);

        let cached = f.router.resolve(&lookup, Mode::Offline).await.unwrap();
        assert_eq!(cached, rows);
        assert_eq!(f.origin.reads(), 1);
        // Every target row is covered as an entity too.
        assert_eq!(f.cache.data().row_count(COVERAGE_TABLE), 4);
    }

    #[tokio::test]
    async fn unreachable_origin_is_connectivity_not_offline() {
        let f = fixture();
        f.origin.fail_when(|_| true);

        let error = f.router.resolve(&a(&PrimaryKey::from(1)), Mode::Online).await.unwrap_err();

        assert!(error.is_connectivity());
        assert_eq!(f.cache.commits(), 0);
    }

    #[tokio::test]
    async fn missing_origin_row_is_not_found_and_not_persisted() {
        let f = fixture();
        let key = PrimaryKey::from(9);

        let error = f.router.resolve(&a(&key), Mode::Online).await.unwrap_err();

        assert!(error.is_not_found());
        assert_eq!(f.cache.commits(), 0);
    }

    #[tokio::test]
    async fn raw_queries_need_an_origin() {
        let router = QueryRouter::new(None, SharedStore::new(MemoryStore::new()), Telemetry::new("test"));
        router.probe().await.unwrap();

        let error = router.raw(Side::Origin, &Query::table("a")).await.unwrap_err();
        assert!(matches!(error, Error::MissingOrigin));
        assert!(router.raw(Side::Cache, &Query::table("a")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn broken_cache_fails_coverage_checks() {
        let f = fixture();
        f.cache.fail_when(|op| matches!(op, StoreOp::Get { .. }));

        let error = f.router.resolve(&a(&PrimaryKey::from(1)), Mode::Online).await.unwrap_err();

        assert!(matches!(error, Error::Store { side: Side::Cache, .. }));
        assert!(f.origin.operations().is_empty());
    }
}
