// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Relational store abstraction for the `standin` offline cache.
//!
//! This crate defines what the caching core needs from a relational backend and nothing
//! more: [`Value`]s and [`Row`]s, [`PrimaryKey`]s, simple single-table [`Query`]s and
//! atomically committed write [`Batch`]es. Backends implement [`Store`]; sessions hold
//! them type-erased as [`SharedStore`].
//!
//! [`MemoryStore`] keeps tables in process memory. It is the default cache of a session
//! and a convenient origin for demos and tests.
//!
//! # Implementing a Store
//!
//! ```
//! use standin_store::{Batch, CommitReport, Error, PrimaryKey, Query, Result, Row, Store, UpsertOutcome};
//!
//! /// A store that has no rows and refuses writes.
//! struct Empty;
//!
//! impl Store for Empty {
//!     async fn get(&self, _table: &str, _key: &PrimaryKey) -> Result<Option<Row>> {
//!         Ok(None)
//!     }
//!
//!     async fn query(&self, _query: &Query) -> Result<Vec<Row>> {
//!         Ok(Vec::new())
//!     }
//!
//!     async fn commit(&self, batch: Batch) -> Result<CommitReport> {
//!         if batch.is_empty() {
//!             Ok(CommitReport::default())
//!         } else {
//!             Err(Error::other("read-only store"))
//!         }
//!     }
//! }
//! ```
//!
//! # Features
//!
//! - `test-util`: enables [`testing::MockStore`], a recording store with failure and
//!   latency injection.

mod batch;
pub mod error;
mod memory;
mod query;
mod row;
mod store;
#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;
mod value;

#[doc(inline)]
pub use batch::{Batch, CommitReport, Upsert, UpsertOutcome};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use memory::MemoryStore;
#[doc(inline)]
pub use query::{Filter, Query};
#[doc(inline)]
pub use row::Row;
#[doc(inline)]
pub use store::{SharedStore, Store};
#[doc(inline)]
pub use value::{KeyError, KeyValue, PrimaryKey, Value};
