// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sessions: the unit of identity, mode and lifetime.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

#[cfg(any(feature = "metrics", test))]
use opentelemetry::metrics::{Meter, MeterProvider};
use parking_lot::Mutex;
use standin_store::{MemoryStore, PrimaryKey, Query, Row, SharedStore, Store};

use crate::{
    Cardinality, Entity, EntityType, Error, Join, Mode, Related, Relationship, Result, Side,
    coverage::CoverageKey,
    flight::Flights,
    identity::IdentityMap,
    router::{Lookup, QueryRouter},
    telemetry::{Activity, SessionStats, Telemetry},
};

const DEFAULT_NAME: &str = "standin";

/// Builder for [`Session`].
///
/// # Examples
///
/// ```
/// use standin::{Mode, Session};
/// use standin_store::MemoryStore;
/// # futures::executor::block_on(async {
///
/// let origin = MemoryStore::new();
/// let session = Session::builder()
///     .origin(origin)
///     .mode(Mode::Freshen)
///     .name("inventory")
///     .open()
///     .await?;
///
/// assert_eq!(session.mode(), Mode::Freshen);
/// assert_eq!(session.name(), "inventory");
/// # Ok::<(), standin::Error>(())
/// # });
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct SessionBuilder {
    origin: Option<SharedStore>,
    cache: Option<SharedStore>,
    mode: Mode,
    name: Option<String>,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<Meter>,
}

impl SessionBuilder {
    /// Sets the authoritative store. Required unless the session is offline.
    pub fn origin<S: Store + 'static>(mut self, store: S) -> Self {
        self.origin = Some(SharedStore::new(store));
        self
    }

    /// Sets the local store. Defaults to a fresh [`MemoryStore`].
    pub fn cache<S: Store + 'static>(mut self, store: S) -> Self {
        self.cache = Some(SharedStore::new(store));
        self
    }

    /// Sets the mode. Defaults to [`Mode::Online`].
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Names the session in log events. Defaults to `"standin"`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Counts session events on a meter of `provider`.
    ///
    /// Every cache hit, miss, fetch, divergence and failure increments the
    /// `standin.event.count` counter, attributed with `session.name` and
    /// `standin.activity`.
    #[cfg(any(feature = "metrics", test))]
    pub fn meter_provider(mut self, provider: &dyn MeterProvider) -> Self {
        self.meter = Some(crate::telemetry::metrics::create_meter(provider));
        self
    }

    /// Opens the session, probing the cache store once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingOrigin`] if the mode is not [`Mode::Offline`] and no origin was
    /// set, or the cache failure if the probe fails.
    pub async fn open(self) -> Result<Session> {
        if self.mode != Mode::Offline && self.origin.is_none() {
            return Err(Error::MissingOrigin);
        }

        let name = self.name.unwrap_or_else(|| DEFAULT_NAME.to_owned());
        let telemetry = Telemetry::new(&name);
        #[cfg(any(feature = "metrics", test))]
        let telemetry = telemetry.with_meter(self.meter.as_ref());
        let cache = self.cache.unwrap_or_else(|| SharedStore::new(MemoryStore::new()));
        let router = QueryRouter::new(self.origin, cache, telemetry.clone());
        router.probe().await?;

        let mode = self.mode;
        let inner = Arc::new_cyclic(|session| SessionInner {
            mode,
            router,
            identity: IdentityMap::new(Weak::clone(session)),
            relationships: Flights::new(),
            queries: Flights::new(),
            query_results: Mutex::new(HashMap::new()),
            telemetry,
        });

        inner.telemetry.session_opened(mode);
        Ok(Session { inner })
    }
}

/// A unit of work over an origin store and its local cache.
///
/// A session owns an identity map: within one session every (entity type, key) pair is
/// represented by exactly one [`Entity`]. Data is read according to the session's
/// [`Mode`], and everything fetched from the origin is written to the cache so a later
/// offline session can read it.
///
/// Closing (or dropping) the session releases every proxy; accessing them afterwards
/// fails with [`Error::NotLive`].
///
/// # Thread safety
///
/// This type is thread-safe. Share it across tasks behind an [`Arc`].
#[derive(Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Starts building a session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// The session name used in log events.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.telemetry.session()
    }

    /// The session mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// A snapshot of the session's counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.inner.telemetry.snapshot()
    }

    /// Loads the entity of type `ty` with the given primary key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such row exists, [`Error::OfflineMiss`] if the
    /// session is offline and the entity was never cached, and the store failure otherwise.
    pub async fn load(&self, ty: &'static EntityType, key: impl Into<PrimaryKey>) -> Result<Entity> {
        self.inner.load(ty, key.into(), self.inner.mode).await
    }

    /// Loads the rows of `ty` returned by `query`, covered under `tag` and `identity`.
    ///
    /// The first call for a (type, tag, identity) triple runs `query` against the origin
    /// (or the cache, when covered) and materializes every row through the identity map;
    /// later calls in the same session return the same entities without a store access.
    /// A later offline session can repeat the call and read the rows from the cache.
    ///
    /// # Errors
    ///
    /// As [`Session::load`], plus [`Error::MissingKeyColumn`] for rows without a primary key.
    pub async fn load_query(
        &self,
        ty: &'static EntityType,
        tag: &str,
        identity: impl Into<PrimaryKey>,
        query: &Query,
    ) -> Result<Arc<[Entity]>> {
        self.inner.load_query(ty, tag, identity.into(), query).await
    }

    /// Runs a query directly against one store, bypassing coverage and the identity map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingOrigin`] for origin queries in an offline session, and the
    /// store failure otherwise.
    pub async fn query(&self, side: Side, query: &Query) -> Result<Vec<Row>> {
        self.inner.ensure_live()?;
        if side == Side::Origin && self.inner.mode == Mode::Offline {
            return Err(Error::MissingOrigin);
        }
        self.inner.router.raw(side, query).await
    }

    /// Closes the session. Equivalent to dropping it.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// State shared by a session and its entities.
#[derive(Debug)]
pub(crate) struct SessionInner {
    mode: Mode,
    router: QueryRouter,
    identity: IdentityMap,
    relationships: Flights<CoverageKey, Result<Related>>,
    queries: Flights<CoverageKey, Result<Arc<[Entity]>>>,
    query_results: Mutex<HashMap<CoverageKey, Arc<[Entity]>>>,
    telemetry: Telemetry,
}

impl SessionInner {
    pub fn is_live(&self) -> bool {
        self.identity.is_open()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_live() { Ok(()) } else { Err(Error::NotLive) }
    }

    fn close(&self) {
        if !self.is_live() {
            return;
        }
        self.identity.close();
        let query_results = std::mem::take(&mut *self.query_results.lock());
        drop(query_results);

        self.telemetry.session_closed();
    }

    async fn load(&self, ty: &'static EntityType, key: PrimaryKey, mode: Mode) -> Result<Entity> {
        let router = &self.router;
        let coverage = CoverageKey::entity(ty, &key);
        let lookup_key = key.clone();
        let fetched = self
            .identity
            .get_or_create(ty, key, move || async move {
                let rows = router.resolve(&Lookup::Entity { ty, key: &lookup_key }, mode).await?;
                rows.into_iter().next().ok_or(Error::NotFound {
                    entity: ty.name,
                    key: lookup_key,
                })
            })
            .await;

        if fetched.joined {
            self.telemetry.record(Activity::Joined, &coverage);
        }
        fetched.value
    }

    /// Resolves and stores one relationship of `owner`; concurrent callers share one resolution.
    pub async fn related(&self, owner: &Entity, relationship: &'static Relationship) -> Result<Related> {
        let coverage = CoverageKey::relationship(owner.entity_type(), owner.key(), relationship);
        let fetched = self
            .relationships
            .fetch_once(coverage.clone(), move || async move {
                if let Some(related) = owner.slot(relationship.name()) {
                    return Ok(related);
                }
                match self.resolve_relationship(owner, relationship).await {
                    Ok(related) => Ok(owner.fill(relationship.name(), related)),
                    Err(error) if error.is_offline_miss() && relationship.offline_fallback() => {
                        Ok(Related::empty(relationship.cardinality()))
                    }
                    Err(error) => Err(error),
                }
            })
            .await;

        if fetched.joined {
            self.telemetry.record(Activity::Joined, &coverage);
        }
        fetched.value
    }

    async fn resolve_relationship(&self, owner: &Entity, relationship: &'static Relationship) -> Result<Related> {
        let mode = self.mode.capped(relationship.mode_cap());
        let owner_type = owner.entity_type();

        let targets = match relationship.join() {
            Join::Outgoing(columns) => {
                let key = owner.data().key(columns).map_err(|error| Error::MissingKeyColumn {
                    entity: owner_type.name,
                    reason: error.to_string(),
                })?;
                match key {
                    Some(key) => vec![self.load(relationship.target(), key, mode).await?],
                    None => Vec::new(),
                }
            }
            Join::Incoming(_) => {
                let query = relationship.incoming_query(owner_type, owner.key())?;
                let lookup = Lookup::Relationship {
                    owner: owner_type,
                    key: owner.key(),
                    relationship,
                    query: &query,
                };
                let rows = self.router.resolve(&lookup, mode).await?;
                let mut targets = self.intern_rows(relationship.target(), rows)?;
                targets.sort_by(|a, b| a.key().cmp(b.key()));
                if let Some(back_reference) = relationship.back_reference() {
                    prefill_back_reference(owner, &targets, back_reference);
                }
                targets
            }
        };

        Ok(match relationship.cardinality() {
            Cardinality::One => Related::One(targets.into_iter().next()),
            Cardinality::Many => Related::Many(targets.into()),
        })
    }

    async fn load_query(&self, ty: &'static EntityType, tag: &str, identity: PrimaryKey, query: &Query) -> Result<Arc<[Entity]>> {
        self.ensure_live()?;
        let coverage = CoverageKey::query(ty, tag, &identity);
        if let Some(entities) = self.query_results.lock().get(&coverage) {
            return Ok(Arc::clone(entities));
        }

        let memo_key = coverage.clone();
        let fetched = self
            .queries
            .fetch_once(coverage.clone(), move || async move {
                if let Some(entities) = self.query_results.lock().get(&memo_key) {
                    return Ok(Arc::clone(entities));
                }
                let lookup = Lookup::Query {
                    ty,
                    tag,
                    identity: &identity,
                    query,
                };
                let rows = self.router.resolve(&lookup, self.mode).await?;
                let entities: Arc<[Entity]> = self.intern_rows(ty, rows)?.into();
                self.ensure_live()?;
                Ok(Arc::clone(self.query_results.lock().entry(memo_key).or_insert(entities)))
            })
            .await;

        if fetched.joined {
            self.telemetry.record(Activity::Joined, &coverage);
        }
        fetched.value
    }

    fn intern_rows(&self, ty: &'static EntityType, rows: Vec<Row>) -> Result<Vec<Entity>> {
        rows.into_iter()
            .map(|row| {
                let key = ty.key_of(&row)?;
                self.identity.intern(ty, key, row)
            })
            .collect()
    }
}

/// Points each target's one-valued back-reference at `owner`, unless already resolved.
fn prefill_back_reference(owner: &Entity, targets: &[Entity], back_reference: &str) {
    for target in targets {
        let Some(relationship) = target.entity_type().relationship(back_reference) else {
            continue;
        };
        if relationship.cardinality() == Cardinality::One {
            target.fill(relationship.name(), Related::One(Some(owner.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::KeyValue;
    use standin_store::{Value, testing::MockStore};

    use super::*;
    use crate::telemetry::{
        ACTIVITY_NAME, SESSION_NAME,
        testing::{LogCapture, MetricTester},
    };

    static A: EntityType = EntityType {
        name: "A",
        table: "a",
        primary_key: &["id"],
        columns: &["id", "name"],
        relationships: &[Relationship::has_many("bs", &B, &["a_id"]).with_back_reference("a")],
    };

    static B: EntityType = EntityType {
        name: "B",
        table: "b",
        primary_key: &["id"],
        columns: &["id", "a_id"],
        relationships: &[Relationship::belongs_to("a", &A, &["a_id"])],
    };

    fn origin() -> MockStore {
        let origin = MockStore::new();
        origin.data().put("a", PrimaryKey::from(1), Row::new().with("id", 1).with("name", "a1"));
        for id in [3, 1, 2] {
            origin.data().put("b", PrimaryKey::from(id), Row::new().with("id", id).with("a_id", 1));
        }
        origin
    }

    #[tokio::test]
    async fn online_session_requires_origin() {
        let error = Session::builder().open().await.unwrap_err();
        assert!(matches!(error, Error::MissingOrigin));

        let offline = Session::builder().mode(Mode::Offline).open().await.unwrap();
        assert_eq!(offline.name(), DEFAULT_NAME);
    }

    #[tokio::test]
    async fn open_fails_on_broken_cache() {
        let cache = MockStore::new();
        cache.fail_when(|_| true);

        let error = Session::builder().origin(origin()).cache(cache).open().await.unwrap_err();
        assert!(matches!(error, Error::Store { side: Side::Cache, .. }));
    }

    #[tokio::test]
    async fn back_references_are_prefilled() {
        let origin = origin();
        let session = Session::builder().origin(origin.clone()).open().await.unwrap();

        let a1 = session.load(&A, 1).await.unwrap();
        let bs = a1.many("bs").await.unwrap();
        let reads = origin.reads();

        let keys: Vec<_> = bs.iter().map(|b| b.key().clone()).collect();
        assert_eq!(keys, vec![PrimaryKey::from(1), PrimaryKey::from(2), PrimaryKey::from(3)]);
        for b in bs.iter() {
            assert!(b.one("a").await.unwrap().unwrap().ptr_eq(&a1));
        }
        assert_eq!(origin.reads(), reads);
    }

    #[tokio::test]
    async fn null_foreign_key_is_none() {
        let origin = MockStore::new();
        origin.data().put("b", PrimaryKey::from(7), Row::new().with("id", 7).with("a_id", Value::Null));
        let session = Session::builder().origin(origin).open().await.unwrap();

        let b = session.load(&B, 7).await.unwrap();

        assert!(b.one("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn raw_origin_queries_are_refused_offline() {
        let session = Session::builder().mode(Mode::Offline).open().await.unwrap();

        let error = session.query(Side::Origin, &Query::table("a")).await.unwrap_err();
        assert!(matches!(error, Error::MissingOrigin));
        assert!(session.query(Side::Cache, &Query::table("a")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_releases_proxies() {
        let session = Session::builder().origin(origin()).open().await.unwrap();
        let a1 = session.load(&A, 1).await.unwrap();
        let bs = a1.many("bs").await.unwrap();

        session.close();

        assert!(!a1.is_live());
        assert!(a1.column("name").unwrap_err().is_not_live());
        assert!(bs[0].related("a").await.unwrap_err().is_not_live());
    }

    #[tokio::test]
    async fn events_are_counted_on_the_meter() {
        let tester = MetricTester::new();
        let origin = origin();
        let cache = MemoryStore::new();

        let online = Session::builder()
            .origin(origin.clone())
            .cache(cache.clone())
            .name("inventory")
            .meter_provider(tester.meter_provider())
            .open()
            .await
            .unwrap();
        online.load(&A, 1).await.unwrap().many("bs").await.unwrap();
        online.close();

        let offline = Session::builder()
            .cache(cache)
            .mode(Mode::Offline)
            .name("inventory")
            .meter_provider(tester.meter_provider())
            .open()
            .await
            .unwrap();
        offline.load(&A, 1).await.unwrap();
        assert!(offline.load(&A, 2).await.unwrap_err().is_offline_miss());

        assert_eq!(tester.event_count("standin.miss"), 2);
        assert_eq!(tester.event_count("standin.fetched"), 2);
        assert_eq!(tester.event_count("standin.hit"), 1);
        assert_eq!(tester.event_count("standin.offline_miss"), 1);
        tester.assert_attributes_contain(&[KeyValue::new(SESSION_NAME, "inventory"), KeyValue::new(ACTIVITY_NAME, "standin.hit")]);
    }

    #[tokio::test]
    async fn diverged_rows_are_counted_and_logged() {
        let origin = origin();
        let cache = MemoryStore::new();
        {
            let online = Session::builder().origin(origin.clone()).cache(cache.clone()).open().await.unwrap();
            online.load(&A, 1).await.unwrap().many("bs").await.unwrap();
        }
        origin
            .data()
            .put("b", PrimaryKey::from(2), Row::new().with("id", 2).with("a_id", 1).with("note", "edited"));

        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let session = Session::builder()
            .origin(origin)
            .cache(cache)
            .mode(Mode::Freshen)
            .name("inventory")
            .open()
            .await
            .unwrap();

        let bs = session.load(&A, 1).await.unwrap().many("bs").await.unwrap();

        assert_eq!(bs[1].row().unwrap().get("note").unwrap().as_text(), Some("edited"));
        assert_eq!(session.stats().diverged_rows, 1);
        capture.assert_contains("WARN");
        capture.assert_contains("standin.diverged");
        capture.assert_contains("B(2)");
        capture.assert_contains("inventory");
    }

    #[tokio::test]
    async fn store_failures_are_logged_as_errors() {
        let origin = origin();
        origin.fail_when(|_| true);
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let session = Session::builder().origin(origin).open().await.unwrap();

        let error = session.load(&A, 1).await.unwrap_err();

        assert!(error.is_connectivity());
        capture.assert_contains("ERROR");
        capture.assert_contains("standin.error");
        capture.assert_contains("origin store is unreachable");
    }

    #[tokio::test]
    async fn lifecycle_is_logged() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let session = Session::builder().mode(Mode::Offline).name("audit").open().await.unwrap();
        session.close();

        capture.assert_contains("standin.session.open");
        capture.assert_contains("standin.session.close");
        capture.assert_contains("audit");
    }

    #[test]
    fn session_is_thread_safe() {
        static_assertions::assert_impl_all!(Session: Send, Sync);
        static_assertions::assert_impl_all!(Entity: Send, Sync);
        static_assertions::assert_impl_all!(Related: Send, Sync);
    }
}
