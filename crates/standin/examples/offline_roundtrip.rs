// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Walks an object graph online, then replays it offline from the cache alone.

use standin::{EntityType, Mode, Relationship, Session};
use standin_store::{MemoryStore, PrimaryKey, Row};

static CUSTOMER: EntityType = EntityType {
    name: "Customer",
    table: "customers",
    primary_key: &["id"],
    columns: &["id", "name"],
    relationships: &[Relationship::has_many("orders", &ORDER, &["customer_id"]).with_back_reference("customer")],
};

static ORDER: EntityType = EntityType {
    name: "Order",
    table: "orders",
    primary_key: &["id"],
    columns: &["id", "customer_id", "total"],
    relationships: &[Relationship::belongs_to("customer", &CUSTOMER, &["customer_id"])],
};

fn seed() -> MemoryStore {
    let origin = MemoryStore::new();
    origin.put("customers", PrimaryKey::from(1), Row::new().with("id", 1).with("name", "Contoso"));
    for (id, total) in [(10, 250), (11, 75), (12, 1200)] {
        origin.put(
            "orders",
            PrimaryKey::from(id),
            Row::new().with("id", id).with("customer_id", 1).with("total", total),
        );
    }
    origin
}

#[tokio::main]
async fn main() -> Result<(), standin::Error> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let cache = MemoryStore::new();

    let online = Session::builder().origin(seed()).cache(cache.clone()).name("online").open().await?;
    let customer = online.load(&CUSTOMER, 1).await?;
    let orders = customer.many("orders").await?;
    println!("online: {} has {} orders", customer.column("name")?, orders.len());
    println!("online: {:?}", online.stats());
    online.close();

    let offline = Session::builder().cache(cache).mode(Mode::Offline).name("offline").open().await?;
    let customer = offline.load(&CUSTOMER, 1).await?;
    for order in customer.many("orders").await?.iter() {
        let owner = order.one("customer").await?;
        println!(
            "offline: order {} totals {} for {:?}",
            order.key(),
            order.column("total")?,
            owner.map(|owner| owner.key().clone())
        );
    }
    println!("offline: {:?}", offline.stats());

    Ok(())
}
