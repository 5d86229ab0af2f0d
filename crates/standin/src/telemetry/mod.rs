// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Session telemetry.
//!
//! Every access a session resolves is recorded as an [`Activity`]. With the `logs`
//! feature each activity is a structured `tracing` event; with the `metrics` feature it
//! increments the `standin.event.count` OpenTelemetry counter of the meter provider given
//! to `SessionBuilder::meter_provider`. The
//! [`SessionStats`] snapshot is always kept.

use std::{
    fmt::Display,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

#[cfg(any(feature = "metrics", test))]
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};

use crate::Mode;

#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

#[cfg(any(feature = "metrics", test))]
pub(crate) const SESSION_NAME: &str = "session.name";
#[cfg(any(feature = "metrics", test))]
pub(crate) const ACTIVITY_NAME: &str = "standin.activity";
#[cfg(test)]
pub(crate) const TARGET_NAME: &str = "standin.target";

/// What a session did to satisfy one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activity {
    /// Served from the cache.
    Hit,
    /// Not covered, going to the origin.
    Miss,
    /// Not covered and offline.
    OfflineMiss,
    /// Fetched from the origin and written to the cache.
    Fetched,
    /// Received the result of another caller's fetch.
    Joined,
    /// A cached row was replaced by a different origin row.
    Diverged,
    /// A store failed.
    Error,
}

#[cfg(any(feature = "logs", test))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Debug,
    Warn,
    Error,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "standin.hit",
            Self::Miss => "standin.miss",
            Self::OfflineMiss => "standin.offline_miss",
            Self::Fetched => "standin.fetched",
            Self::Joined => "standin.joined",
            Self::Diverged => "standin.diverged",
            Self::Error => "standin.error",
        }
    }

    #[cfg(any(feature = "logs", test))]
    fn level(self) -> Level {
        match self {
            Self::Hit | Self::Miss | Self::OfflineMiss | Self::Fetched | Self::Joined => Level::Debug,
            Self::Diverged => Level::Warn,
            Self::Error => Level::Error,
        }
    }
}

/// A point-in-time snapshot of a session's counters.
///
/// # Examples
///
/// ```
/// use standin::{Mode, Session};
/// # futures::executor::block_on(async {
///
/// let session = Session::builder().mode(Mode::Offline).open().await?;
/// assert_eq!(session.stats().origin_fetches, 0);
/// # Ok::<(), standin::Error>(())
/// # });
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Accesses served from the cache store.
    pub cache_hits: u64,
    /// Fetches that went to the origin store.
    pub origin_fetches: u64,
    /// Accesses that failed because the data was not cached while offline.
    pub offline_misses: u64,
    /// Accesses that waited for a fetch started by another caller.
    pub joined: u64,
    /// Cached rows replaced by different origin rows.
    pub diverged_rows: u64,
    /// Store failures.
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    origin_fetches: AtomicU64,
    offline_misses: AtomicU64,
    joined: AtomicU64,
    diverged_rows: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn get(&self, activity: Activity) -> Option<&AtomicU64> {
        match activity {
            Activity::Hit => Some(&self.cache_hits),
            Activity::Fetched => Some(&self.origin_fetches),
            Activity::OfflineMiss => Some(&self.offline_misses),
            Activity::Joined => Some(&self.joined),
            Activity::Diverged => Some(&self.diverged_rows),
            Activity::Error => Some(&self.errors),
            Activity::Miss => None,
        }
    }
}

/// Records the activity of one session.
#[derive(Clone, Debug)]
pub(crate) struct Telemetry {
    session: Arc<str>,
    counters: Arc<Counters>,
    #[cfg(any(feature = "metrics", test))]
    event_counter: Option<Counter<u64>>,
}

impl Telemetry {
    pub fn new(session: &str) -> Self {
        Self {
            session: Arc::from(session),
            counters: Arc::default(),
            #[cfg(any(feature = "metrics", test))]
            event_counter: None,
        }
    }

    /// Also counts every activity on `meter`.
    #[cfg(any(feature = "metrics", test))]
    pub fn with_meter(mut self, meter: Option<&Meter>) -> Self {
        self.event_counter = meter.map(metrics::create_event_counter);
        self
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn record(&self, activity: Activity, target: &dyn Display) {
        self.count(activity);
        self.emit(activity, target, None, None);
    }

    pub fn record_fetched(&self, target: &dyn Display, written: usize) {
        self.count(Activity::Fetched);
        self.emit(Activity::Fetched, target, Some(written), None);
    }

    pub fn record_error(&self, target: &dyn Display, error: &crate::Error) {
        self.count(Activity::Error);
        self.emit(Activity::Error, target, None, Some(error));
    }

    pub fn snapshot(&self) -> SessionStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        SessionStats {
            cache_hits: load(&self.counters.cache_hits),
            origin_fetches: load(&self.counters.origin_fetches),
            offline_misses: load(&self.counters.offline_misses),
            joined: load(&self.counters.joined),
            diverged_rows: load(&self.counters.diverged_rows),
            errors: load(&self.counters.errors),
        }
    }

    #[cfg_attr(not(any(feature = "logs", test)), expect(unused_variables, reason = "only read by log events"))]
    pub fn session_opened(&self, mode: Mode) {
        #[cfg(any(feature = "logs", test))]
        tracing::debug!(session.name = &*self.session, session.mode = mode.as_str(), "standin.session.open");
    }

    pub fn session_closed(&self) {
        #[cfg(any(feature = "logs", test))]
        {
            let stats = self.snapshot();
            tracing::debug!(
                session.name = &*self.session,
                standin.cache_hits = stats.cache_hits,
                standin.origin_fetches = stats.origin_fetches,
                "standin.session.close"
            );
        }
    }

    fn count(&self, activity: Activity) {
        if let Some(counter) = self.counters.get(activity) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(any(feature = "metrics", test))]
        if let Some(counter) = &self.event_counter {
            counter.add(
                1,
                &[
                    KeyValue::new(SESSION_NAME, self.session.to_string()),
                    KeyValue::new(ACTIVITY_NAME, activity.as_str()),
                ],
            );
        }
    }

    #[cfg_attr(not(any(feature = "logs", test)), expect(unused_variables, reason = "only read by log events"))]
    fn emit(&self, activity: Activity, target: &dyn Display, written: Option<usize>, error: Option<&crate::Error>) {
        #[cfg(any(feature = "logs", test))]
        {
            let session = &*self.session;
            let activity_name = activity.as_str();

            // Field names must match the constants above.
            macro_rules! emit_event {
                ($level:ident) => {
                    tracing::$level!(
                        session.name = session,
                        standin.activity = activity_name,
                        standin.target = %target,
                        standin.written = written,
                        error = error.map(tracing::field::display),
                        "standin.event"
                    )
                };
            }

            match activity.level() {
                Level::Debug => emit_event!(debug),
                Level::Warn => emit_event!(warn),
                Level::Error => emit_event!(error),
            }
        }
    }
}
