// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! An identity-mapped entity cache that keeps working when the origin database is offline.
//!
//! A [`Session`] sits between an *origin* store (the authoritative database, possibly
//! unreachable) and a *cache* store (a local mirror). Entities are loaded by primary key
//! and their relationships are resolved lazily, on first access. Everything fetched from
//! the origin is written through to the cache together with a *coverage* record, so a
//! later session in [`Mode::Offline`] can walk the same object graph without the origin.
//!
//! Within one session:
//! - every (entity type, key) pair is represented by exactly one [`Entity`];
//! - concurrent accesses to the same entity, relationship or query share a single fetch;
//! - a resolved relationship is never fetched again.
//!
//! # Examples
//!
//! ```
//! use standin::{EntityType, Mode, Relationship, Session};
//! use standin_store::{MemoryStore, PrimaryKey, Row};
//!
//! static AUTHOR: EntityType = EntityType {
//!     name: "Author",
//!     table: "authors",
//!     primary_key: &["id"],
//!     columns: &["id", "name"],
//!     relationships: &[Relationship::has_many("books", &BOOK, &["author_id"]).with_back_reference("author")],
//! };
//!
//! static BOOK: EntityType = EntityType {
//!     name: "Book",
//!     table: "books",
//!     primary_key: &["id"],
//!     columns: &["id", "author_id", "title"],
//!     relationships: &[Relationship::belongs_to("author", &AUTHOR, &["author_id"])],
//! };
//!
//! # futures::executor::block_on(async {
//! let origin = MemoryStore::new();
//! origin.put("authors", PrimaryKey::from(1), Row::new().with("id", 1).with("name", "Ursula"));
//! origin.put("books", PrimaryKey::from(7), Row::new().with("id", 7).with("author_id", 1).with("title", "Lathe"));
//! let cache = MemoryStore::new();
//!
//! let online = Session::builder().origin(origin).cache(cache.clone()).open().await?;
//! let author = online.load(&AUTHOR, 1).await?;
//! let books = author.many("books").await?;
//! assert_eq!(books[0].column("title")?.as_text(), Some("Lathe"));
//! online.close();
//!
//! let offline = Session::builder().cache(cache).mode(Mode::Offline).open().await?;
//! let author = offline.load(&AUTHOR, 1).await?;
//! assert_eq!(author.many("books").await?.len(), 1);
//! # Ok::<(), standin::Error>(())
//! # });
//! ```
//!
//! # Features
//!
//! - `logs`: emits a `tracing` event for every cache hit, miss, fetch, divergence and
//!   store failure.
//! - `metrics`: adds `SessionBuilder::meter_provider`, counting the same events on an
//!   OpenTelemetry `standin.event.count` counter.
//! - `test-util`: enables `standin_store::testing::MockStore` for tests of code built on
//!   this crate.

mod coverage;
mod entity;
mod error;
mod flight;
mod identity;
mod mode;
mod router;
mod schema;
mod session;
mod telemetry;
mod writer;

#[doc(inline)]
pub use coverage::COVERAGE_TABLE;
#[doc(inline)]
pub use entity::{Entity, Related};
#[doc(inline)]
pub use error::{Error, Result, Side};
#[doc(inline)]
pub use mode::{Mode, ParseModeError};
#[doc(inline)]
pub use schema::{Cardinality, EntityType, Join, Relationship};
#[doc(inline)]
pub use session::{Session, SessionBuilder};
#[doc(inline)]
pub use telemetry::SessionStats;
