// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Proxy lifetime and misuse errors.

mod common;

use common::*;
use standin::{Error, Mode, Related};
use standin_store::{MemoryStore, PrimaryKey, Row, Value};

#[tokio::test]
async fn proxies_are_dead_after_close() {
    let origin = origin();
    let session = open(&origin, &MemoryStore::new(), Mode::Online).await;
    let a1 = session.load(&A, 1).await.unwrap();
    let b1 = a1.many("bs").await.unwrap()[0].clone();
    assert!(a1.is_live());

    session.close();

    assert!(!a1.is_live());
    assert!(a1.column("name").unwrap_err().is_not_live());
    assert!(a1.row().unwrap_err().is_not_live());
    assert!(a1.related("bs").await.unwrap_err().is_not_live());
    assert!(b1.one("a").await.unwrap_err().is_not_live());
    // Identity survives the session.
    assert_eq!(a1.key(), &PrimaryKey::from(1));
}

#[tokio::test]
async fn dropping_the_session_closes_it() {
    let origin = origin();
    let a1 = {
        let session = open(&origin, &MemoryStore::new(), Mode::Online).await;
        session.load(&A, 1).await.unwrap()
    };

    assert!(matches!(a1.column("id"), Err(Error::NotLive)));
}

#[tokio::test]
async fn misuse_is_reported() {
    let origin = origin();
    let session = open(&origin, &MemoryStore::new(), Mode::Online).await;
    let a1 = session.load(&A, 1).await.unwrap();

    let error = a1.column("missing").unwrap_err();
    assert_eq!(error.to_string(), r#"A has no column "missing""#);

    let error = a1.related("missing").await.unwrap_err();
    assert!(matches!(error, Error::UnknownRelationship { entity: "A", .. }));

    let error = a1.one("bs").await.unwrap_err();
    assert!(matches!(error, Error::Cardinality { relationship: "bs", expected: "one", .. }));

    let error = a1.many("c").await.unwrap_err();
    assert!(matches!(error, Error::Cardinality { relationship: "c", expected: "many", .. }));
}

#[tokio::test]
async fn declared_columns_missing_from_the_row_read_as_null() {
    let origin = origin();
    origin.data().put("b", PrimaryKey::from(8), Row::new().with("id", 8).with("a_id", 2));
    let session = open(&origin, &MemoryStore::new(), Mode::Online).await;

    let b8 = session.load(&B, 8).await.unwrap();

    assert_eq!(b8.column("label").unwrap(), &Value::Null);
    assert_eq!(format!("{b8:?}"), "B(8)");
}

#[tokio::test]
async fn related_exposes_both_cardinalities_as_slices() {
    let origin = origin();
    let session = open(&origin, &MemoryStore::new(), Mode::Online).await;
    let a1 = session.load(&A, 1).await.unwrap();

    let bs = a1.related("bs").await.unwrap();
    assert!(matches!(bs, Related::Many(_)));
    assert_eq!(bs.as_slice().len(), 3);

    let c = a1.related("c").await.unwrap();
    assert!(matches!(c, Related::One(None)));
    assert!(c.as_slice().is_empty());

    let a = bs.as_slice()[0].related("a").await.unwrap();
    assert!(a.as_slice()[0].ptr_eq(&a1));
}

#[tokio::test]
async fn connectivity_failures_are_not_offline_misses() {
    let origin = origin();
    origin.fail_when(|_| true);
    let session = open(&origin, &MemoryStore::new(), Mode::Online).await;

    let error = session.load(&A, 1).await.unwrap_err();

    assert!(error.is_connectivity());
    assert!(!error.is_offline_miss());
    assert!(std::error::Error::source(&error).is_some());
}

#[tokio::test]
async fn covered_data_stays_usable_while_the_origin_is_down() {
    let origin = origin();
    let cache = MemoryStore::new();
    let first = open(&origin, &cache, Mode::Online).await;
    first.load(&A, 1).await.unwrap().many("bs").await.unwrap();
    first.close();

    origin.fail_when(|_| true);
    let second = open(&origin, &cache, Mode::Online).await;

    let a1 = second.load(&A, 1).await.unwrap();
    assert_eq!(a1.column("name").unwrap().as_text(), Some("a1"));
    assert_eq!(a1.many("bs").await.unwrap().len(), 3);
    assert!(second.load(&A, 2).await.unwrap_err().is_connectivity());
}
