//! Purchase workflow integration tests: stock accounting across the order
//! and catalog services, under contention and across the replica pair.

mod support;

use std::sync::Arc;

use bookstore::bus::topic;
use serde_json::Value;

use support::Deployment;

#[tokio::test]
async fn last_unit_sells_once() {
    let deployment = Deployment::new();
    let id = deployment.add_book("Dune", 1);
    let orders = &deployment.order_primary;

    let reply = orders.purchase(id).await.unwrap();
    assert_eq!(reply["order"]["count"], 1);
    assert_eq!(reply["order"]["book_info"]["books"]["id"], id);
    assert_eq!(deployment.catalog_primary.store().book(id).unwrap().count, 0);

    let err = orders.purchase(id).await.unwrap_err();
    assert!(err.is_out_of_stock());
    assert_eq!(err.status_code(), 403);
    assert_eq!(orders.list_orders().unwrap()["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_buyers_never_oversell() {
    let deployment = Deployment::new();
    let id = deployment.add_book("Dune", 3);
    let orders = Arc::clone(&deployment.order_primary);

    let tasks: Vec<_> = (0..24)
        .map(|_| {
            let orders = Arc::clone(&orders);
            tokio::spawn(async move { orders.purchase(id).await })
        })
        .collect();

    let mut sold = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => sold += 1,
            Err(e) => assert!(e.is_out_of_stock(), "unexpected failure: {}", e),
        }
    }

    assert_eq!(sold, 3);
    assert_eq!(deployment.catalog_primary.store().book(id).unwrap().count, 0);
    assert_eq!(orders.list_orders().unwrap()["orders"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unknown_book_is_not_found_and_records_nothing() {
    let deployment = Deployment::new();

    let err = deployment.order_primary.purchase(7).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert!(deployment.order_primary.list_orders().unwrap()["orders"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn replica_pair_sells_from_its_own_copy() {
    let deployment = Deployment::new();
    let id = deployment.add_book("Dune", 1);

    // The replica copies the primary on first use, then the two drift.
    deployment.order_primary.purchase(id).await.unwrap();
    let err = deployment.order_replica.purchase(id).await.unwrap_err();
    assert!(err.is_out_of_stock());

    let late = deployment.add_book("Emma", 1);
    let err = deployment.order_replica.purchase(late).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert!(deployment.order_primary.purchase(late).await.is_ok());
}

#[tokio::test]
async fn confirmations_are_relayed_to_the_replica_topic() {
    let deployment = Deployment::new();
    let id = deployment.add_book("Dune", 2);
    let seen = deployment.bus.subscribe(&[
        topic::ORDER_CONFIRMATION_ORIGINAL,
        topic::ORDER_CONFIRMATION_REPLICA,
        topic::CACHE_INVALIDATE,
    ]);
    let relay = deployment.order_primary.watch_confirmations(&deployment.bus);

    deployment.order_primary.purchase(id).await.unwrap();

    let mut events = Vec::new();
    let relayed = support::eventually(|| {
        events.extend(seen.drain());
        events.iter().any(|e| e.topic == topic::ORDER_CONFIRMATION_REPLICA)
    })
    .await;
    assert!(relayed);

    let original = events
        .iter()
        .find(|e| e.topic == topic::ORDER_CONFIRMATION_ORIGINAL)
        .unwrap();
    assert_eq!(original.payload["order_info"]["book_id"], id);
    assert_eq!(original.payload["order_info"]["book_info"]["books"]["name"], "Dune");

    let invalidate = events
        .iter()
        .find(|e| e.topic == topic::CACHE_INVALIDATE)
        .unwrap();
    assert_eq!(invalidate.payload["origin"], "order-primary");
    assert_eq!(invalidate.payload["key"]["value"], Value::from(id));

    let stats = relay.stop();
    assert_eq!(stats.failed, 0);
}
