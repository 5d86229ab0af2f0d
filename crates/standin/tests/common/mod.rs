// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(dead_code, reason = "This is a test module")]

//! Shared schema and fixtures for the integration tests.
//!
//! `A(1)` owns three `B` rows and no `C`; `A(2)` owns nothing.

use std::time::Duration;

use standin::{EntityType, Mode, Relationship, Session};
use standin_store::{MemoryStore, PrimaryKey, Row, testing::MockStore};

pub static A: EntityType = EntityType {
    name: "A",
    table: "a",
    primary_key: &["id"],
    columns: &["id", "name"],
    relationships: &[
        Relationship::has_many("bs", &B, &["a_id"]).with_back_reference("a"),
        Relationship::has_many("pinned_bs", &B, &["a_id"]).with_mode_cap(Mode::Online),
        Relationship::has_one("c", &C, &["a_id"]).with_back_reference("a"),
    ],
};

pub static B: EntityType = EntityType {
    name: "B",
    table: "b",
    primary_key: &["id"],
    columns: &["id", "a_id", "label"],
    relationships: &[Relationship::belongs_to("a", &A, &["a_id"])],
};

pub static C: EntityType = EntityType {
    name: "C",
    table: "c",
    primary_key: &["id"],
    columns: &["id", "a_id"],
    relationships: &[Relationship::belongs_to("a", &A, &["a_id"])],
};

pub fn a_row(id: i64, name: &str) -> Row {
    Row::new().with("id", id).with("name", name)
}

pub fn b_row(id: i64, a_id: i64, label: &str) -> Row {
    Row::new().with("id", id).with("a_id", a_id).with("label", label)
}

/// An origin holding the two `A` rows and the three `B` rows of `A(1)`.
pub fn origin() -> MockStore {
    let origin = MockStore::new();
    origin.data().put("a", PrimaryKey::from(1), a_row(1, "a1"));
    origin.data().put("a", PrimaryKey::from(2), a_row(2, "a2"));
    for id in 1..=3 {
        origin.data().put("b", PrimaryKey::from(id), b_row(id, 1, &format!("b{id}")));
    }
    origin
}

/// Same as [`origin`], answering every store call after `latency`.
pub fn slow_origin(latency: Duration) -> MockStore {
    origin().with_latency(latency)
}

pub async fn open(origin: &MockStore, cache: &MemoryStore, mode: Mode) -> Session {
    Session::builder()
        .origin(origin.clone())
        .cache(cache.clone())
        .mode(mode)
        .open()
        .await
        .unwrap()
}

pub async fn open_offline(cache: &MemoryStore) -> Session {
    Session::builder().cache(cache.clone()).mode(Mode::Offline).open().await.unwrap()
}
